//! The message taxonomy the Extractor classifies incoming bytes into.

/// One window-creation/update sub-kind, carried by `WindowCreateOrUpdate`.
///
/// The kind token is case-folded at classification time; the variants below
/// are the canonical (lower-case) forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Logic,
    Scope,
    ScopeXy,
    Fft,
    Spectro,
    Plot,
    Term,
    Bitmap,
    Midi,
}

impl WindowKind {
    /// Looks up a kind by its lower-cased ASCII token, or `None` if `token`
    /// names a user-defined window instead of a built-in kind.
    pub(crate) fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"logic" => Some(Self::Logic),
            b"scope" => Some(Self::Scope),
            b"scope_xy" => Some(Self::ScopeXy),
            b"fft" => Some(Self::Fft),
            b"spectro" => Some(Self::Spectro),
            b"plot" => Some(Self::Plot),
            b"term" => Some(Self::Term),
            b"bitmap" => Some(Self::Bitmap),
            b"midi" => Some(Self::Midi),
            _ => None,
        }
    }
}

/// The full set of message types the Extractor can produce.
///
/// `DebuggerFrame` and `CogMessage` carry a COG index 0..=7 rather than being
/// eight separate enum variants purely to avoid an eight-armed enum; the COG
/// index is very much part of a message's identity for routing purposes — a
/// sink registered for `CogMessage { cog: 3 }` is a per-COG-3 window and must
/// not observe COG 1's traffic. See [`MessageType::route_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    BinaryDebugPacket,
    DebuggerFrame { cog: u8 },
    CogMessage { cog: u8 },
    P2SystemInit,
    WindowCreateOrUpdate { kind: WindowKind },
    WindowUpdateNamed { name: NameId },
    InvalidCog { cog: u8 },
    TerminalOutput,
}

/// The key the `RouteTable` fans sinks out on — one entry per exact COG
/// index, window kind, or window name, never collapsed to the outer
/// `MessageType` variant the way [`MessageType::kind_index`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RouteKey {
    BinaryDebugPacket,
    DebuggerFrame(u8),
    CogMessage(u8),
    P2SystemInit,
    WindowCreateOrUpdate(WindowKind),
    WindowUpdateNamed(NameId),
    InvalidCog(u8),
    TerminalOutput,
}

/// An interned window name, handed out by [`crate::router::NameTable`].
///
/// `WindowUpdateNamed` needs the routing target's name available to every
/// consumer of `MessageType`, including the `Copy` mailbox envelope handed
/// from the Extractor to the Router — interning keeps that type `Copy`
/// without allocating a `String` per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameId(pub(crate) u32);

/// Number of distinct message-type *kinds* (ignoring the COG/window-kind
/// payload carried by some variants), used to size the per-type
/// instrumentation arrays in [`crate::metrics::Stats`].
pub const KIND_COUNT: usize = 8;

impl MessageType {
    /// A stable small index for this message's *kind*, used only to size and
    /// index the coarse per-type instrumentation counters in
    /// [`crate::metrics::Stats`]. COG index and window kind are deliberately
    /// not distinguished here — that's fine for aggregate counters, but this
    /// must never be used to decide sink fan-out; see
    /// [`MessageType::route_key`] for that.
    #[inline]
    pub(crate) fn kind_index(&self) -> usize {
        match self {
            Self::BinaryDebugPacket => 0,
            Self::DebuggerFrame { .. } => 1,
            Self::CogMessage { .. } => 2,
            Self::P2SystemInit => 3,
            Self::WindowCreateOrUpdate { .. } => 4,
            Self::WindowUpdateNamed { .. } => 5,
            Self::InvalidCog { .. } => 6,
            Self::TerminalOutput => 7,
        }
    }

    /// The full routing identity of this message — unlike
    /// [`MessageType::kind_index`], this distinguishes `CogMessage { cog: 3
    /// }` from `CogMessage { cog: 1 }`, and `WindowCreateOrUpdate { kind:
    /// Scope }` from `kind: Bitmap`. This is the key the `RouteTable` fans
    /// out on: a sink registered for one COG or one window kind must never
    /// observe another's traffic.
    #[inline]
    pub(crate) fn route_key(&self) -> RouteKey {
        match *self {
            Self::BinaryDebugPacket => RouteKey::BinaryDebugPacket,
            Self::DebuggerFrame { cog } => RouteKey::DebuggerFrame(cog),
            Self::CogMessage { cog } => RouteKey::CogMessage(cog),
            Self::P2SystemInit => RouteKey::P2SystemInit,
            Self::WindowCreateOrUpdate { kind } => RouteKey::WindowCreateOrUpdate(kind),
            Self::WindowUpdateNamed { name } => RouteKey::WindowUpdateNamed(name),
            Self::InvalidCog { cog } => RouteKey::InvalidCog(cog),
            Self::TerminalOutput => RouteKey::TerminalOutput,
        }
    }

    /// Human-readable name for logging and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::BinaryDebugPacket => "BinaryDebugPacket",
            Self::DebuggerFrame { .. } => "DebuggerFrame",
            Self::CogMessage { .. } => "CogMessage",
            Self::P2SystemInit => "P2SystemInit",
            Self::WindowCreateOrUpdate { .. } => "WindowCreateOrUpdate",
            Self::WindowUpdateNamed { .. } => "WindowUpdateNamed",
            Self::InvalidCog { .. } => "InvalidCog",
            Self::TerminalOutput => "TerminalOutput",
        }
    }
}

/// The exact text (excluding the EOL terminator) of a `CogMessage[0]` that
/// triggers a golden-sync reset instead of being routed as a plain
/// `CogMessage`.
pub const P2_SYSTEM_INIT_TEXT: &[u8] = b"Cog0 INIT $0000_0000 $0000_0000 load";

/// Fixed length in bytes of a `DebuggerFrame`, COG index included.
pub const DEBUGGER_FRAME_LEN: usize = 416;

/// Start byte that opens a window command (`WindowCreateOrUpdate` or
/// `WindowUpdateNamed`).
pub const WINDOW_COMMAND_START: u8 = 0x60; // '`'

/// Start byte for a `CogMessage` header.
pub const COG_MESSAGE_START: u8 = 0x43; // 'C'

/// Start byte for a `BinaryDebugPacket` header.
pub const BINARY_DEBUG_START: u8 = 0xDB;

/// Length in bytes of a `BinaryDebugPacket` header (`0xDB` + little-endian u16 length).
pub const BINARY_HEADER_LEN: usize = 3;

/// Bytes that, seen as the very next byte after a candidate line terminator,
/// indicate the terminator belongs to a *new* message rather than being part
/// of the text payload just scanned — the one-byte EOL-disambiguation
/// lookahead.
#[inline]
pub(crate) fn is_message_start_byte(b: u8) -> bool {
    matches!(b, 0x60 | 0x43 | 0xDB | 0x00..=0x07)
}
