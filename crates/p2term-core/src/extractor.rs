//! Framing and classification: the background thread that turns a raw byte
//! stream into classified, pool-backed messages.

use crate::byte_ring::ByteRing;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::message::{
    is_message_start_byte, MessageType, WindowKind, BINARY_HEADER_LEN, DEBUGGER_FRAME_LEN,
    P2_SYSTEM_INIT_TEXT, WINDOW_COMMAND_START,
};
use crate::metrics::Stats;
use crate::router::{EventListener, RouteTable, RouterEnvelope};
use crate::slot::SlotPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::warn;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// Outcome of one attempt at framing+classification, driving the thread
/// loop's park/yield decision.
enum Outcome {
    Emitted,
    /// Not enough bytes in the ring yet to decide; nothing was consumed.
    Incomplete,
    /// Bytes were consumed but no message was dispatched (corrupt binary
    /// header discarded, post-debugger-frame zero run absorbed).
    Progressed,
}

/// Where a candidate text terminator was found and how long it is.
struct TextMatch {
    /// Total bytes to consume, terminator included.
    total_len: usize,
}

/// The framing/classification state machine. Owns no state across calls to
/// `try_extract_one` other than the ring's own read position — every
/// candidate is evaluated fresh from the current head, matching spec's
/// `Idle` state on entry.
pub struct Extractor {
    ring: Arc<ByteRing>,
    pool: Arc<SlotPool>,
    route_table: Arc<RouteTable>,
    mailbox: Arc<crate::mailbox::Mailbox<RouterEnvelope>>,
    stats: Arc<Stats>,
    listener: Arc<dyn EventListener>,
    config: CoreConfig,
    paused: AtomicBool,
    shutdown: AtomicBool,
}

impl Extractor {
    pub fn new(
        ring: Arc<ByteRing>,
        pool: Arc<SlotPool>,
        route_table: Arc<RouteTable>,
        mailbox: Arc<crate::mailbox::Mailbox<RouterEnvelope>>,
        stats: Arc<Stats>,
        listener: Arc<dyn EventListener>,
        config: CoreConfig,
    ) -> Self {
        Self {
            ring,
            pool,
            route_table,
            mailbox,
            stats,
            listener,
            config,
            paused: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Spawns the dedicated extraction thread. Returns its join handle so
    /// the control plane can park on shutdown.
    pub fn spawn(self: Arc<Self>) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("p2term-extractor".into())
            .spawn(move || self.run())
            .expect("failed to spawn extractor thread")
    }

    /// Pauses classification; used during golden-sync reset. Idempotent.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resumes classification after a pause.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Signals the extraction thread to terminate at its next loop check.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn run(&self) {
        let mut batch_count = 0usize;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            if self.paused.load(Ordering::Acquire) {
                thread::park_timeout(self.config.extractor_idle_park);
                continue;
            }
            match self.try_extract_one() {
                Outcome::Emitted => {
                    batch_count += 1;
                    if batch_count >= self.config.extractor_batch_cap {
                        thread::yield_now();
                        batch_count = 0;
                    }
                }
                Outcome::Progressed => {
                    // More may be immediately extractable; don't park.
                }
                Outcome::Incomplete => {
                    batch_count = 0;
                    thread::park_timeout(self.config.extractor_idle_park);
                }
            }
        }
    }

    /// One pass of §4.3.3's classification order, starting fresh from the
    /// ring's current read position.
    fn try_extract_one(&self) -> Outcome {
        let lookahead = self.ring.peek(1);
        let Some(&first) = lookahead.first() else {
            return Outcome::Incomplete;
        };

        if first == crate::message::BINARY_DEBUG_START {
            return self.try_binary();
        }

        // A candidate opening on a potential DebuggerFrame start byte is only
        // ambiguous with text for its first 416 bytes — §4.3.3 tries
        // DebuggerFrame last specifically because a large text message could
        // coincidentally open with such a byte, but a *run* of 416 bytes
        // with no terminator at all is never mistaken for text.
        let debugger_candidate = (0..=7).contains(&first);
        let scan_limit = if debugger_candidate {
            DEBUGGER_FRAME_LEN - 1
        } else {
            self.config.max_text_length
        };

        if let Some(m) = self.try_text_boundary(scan_limit) {
            return self.emit_text(m.total_len);
        }

        if debugger_candidate {
            return if self.ring.available() >= DEBUGGER_FRAME_LEN {
                self.emit_debugger_frame(first)
            } else {
                Outcome::Incomplete
            };
        }

        if self.ring.available() > self.config.max_text_length {
            return self.force_abandon_text();
        }
        Outcome::Incomplete
    }

    /// Scans for a valid (disambiguated) text terminator within the first
    /// `limit` bytes, fetching one extra byte past that (`limit + 1` total)
    /// purely as the one-byte EOL-disambiguation lookahead. Byte `limit`
    /// itself is never a valid terminator-start position and never
    /// contributes to a terminator's second byte — a message whose
    /// terminator would only complete at or past `limit` is too long, not a
    /// match. Returns `None` if no terminator was found in that window,
    /// whether because the window is exhausted or because more data is
    /// still needed — the caller decides what "not found" means for its
    /// candidate.
    fn try_text_boundary(&self, limit: usize) -> Option<TextMatch> {
        let available = self.ring.available();
        let scan_len = available.min(limit + 1);
        let buf = self.ring.peek(scan_len);
        let truncated = scan_len < available;

        let mut idx = 0usize;
        while idx < limit && idx < buf.len() {
            let b = buf[idx];
            if b == CR || b == LF {
                let mut term_len = 1;
                if idx + 1 < limit && idx + 1 < buf.len() {
                    let b2 = buf[idx + 1];
                    if (b == CR && b2 == LF) || (b == LF && b2 == CR) {
                        term_len = 2;
                    }
                }
                let total_len = idx + term_len;
                let lookahead_idx = total_len;
                if lookahead_idx >= buf.len() {
                    if truncated {
                        // More bytes exist beyond this scan window; we can't
                        // yet tell whether the next one disambiguates this
                        // terminator, so this candidate is incomplete rather
                        // than a real end-of-stream match.
                        break;
                    }
                    return Some(TextMatch { total_len });
                }
                if is_message_start_byte(buf[lookahead_idx]) {
                    return Some(TextMatch { total_len });
                }
            }
            idx += 1;
        }

        None
    }

    /// No valid terminator appeared within `max_text_length` bytes. Rather
    /// than buffer forever, dispatch exactly `max_text_length` bytes as a
    /// truncated `TerminalOutput` so the ring keeps draining; this is the
    /// core's answer to §4.3.1's "abandoned (no match)" wording, which
    /// otherwise leaves the recovery path unspecified.
    fn force_abandon_text(&self) -> Outcome {
        let max_len = self.config.max_text_length;
        warn!(max_len, "text candidate exceeded max length, forcing truncated dispatch");
        let bytes = self.ring.peek(max_len);
        self.ring.advance(max_len);
        self.dispatch(MessageType::TerminalOutput, &bytes);
        Outcome::Emitted
    }

    fn try_binary(&self) -> Outcome {
        if self.ring.available() < BINARY_HEADER_LEN {
            return Outcome::Incomplete;
        }
        let header = self.ring.peek(BINARY_HEADER_LEN);
        let len = header[1] as usize | ((header[2] as usize) << 8);

        if len > self.config.max_binary_payload {
            self.ring.advance(1);
            self.stats.record_corrupt_binary_length();
            warn!(declared = len, "discarding corrupt binary debug packet header");
            return Outcome::Progressed;
        }

        let total_len = BINARY_HEADER_LEN + len;
        if self.ring.available() < total_len {
            return Outcome::Incomplete;
        }

        let bytes = self.ring.peek(total_len);
        self.ring.advance(total_len);
        self.dispatch(MessageType::BinaryDebugPacket, &bytes);
        Outcome::Emitted
    }

    fn emit_text(&self, total_len: usize) -> Outcome {
        let bytes = self.ring.peek(total_len);
        self.ring.advance(total_len);
        let terminator_len = terminator_len(&bytes);
        let content = &bytes[..bytes.len() - terminator_len];
        let message_type = classify_text(content, self.route_table.names());
        self.dispatch(message_type, &bytes);
        Outcome::Emitted
    }

    fn emit_debugger_frame(&self, cog: u8) -> Outcome {
        let bytes = self.ring.peek(DEBUGGER_FRAME_LEN);
        self.ring.advance(DEBUGGER_FRAME_LEN);
        self.dispatch(MessageType::DebuggerFrame { cog }, &bytes);

        while self.ring.peek(1).first() == Some(&0) {
            self.ring.advance(1);
        }
        Outcome::Emitted
    }

    fn dispatch(&self, message_type: MessageType, data: &[u8]) {
        self.stats.record_ring_occupancy(self.ring.available());

        let slot_id = match self.pool.acquire(data.len()) {
            Ok(id) => id,
            Err(CoreError::PoolExhausted { tier }) => {
                self.stats.record_dropped_on_pool_full();
                self.listener.on_pool_exhausted(tier);
                return;
            }
            Err(_) => {
                self.stats.record_dropped_on_pool_full();
                return;
            }
        };
        self.pool.set_type(slot_id, message_type);
        self.pool.write_data(slot_id, data);

        if matches!(message_type, MessageType::InvalidCog { .. }) {
            self.stats.record_invalid_cog();
        }
        self.stats.record_extracted(message_type.kind_index());

        let fanout = self.route_table.fanout_count(message_type);
        self.pool.publish(slot_id, fanout);

        if fanout == 0 {
            self.pool.release(slot_id);
            return;
        }

        let envelope = RouterEnvelope { slot_id, message_type };
        if !self.mailbox.push(envelope) {
            for _ in 0..fanout {
                self.pool.release(slot_id);
            }
            self.stats.record_dropped_envelope();
            self.listener.on_mailbox_full(message_type);
            warn!(kind = message_type.kind_name(), "router mailbox full, envelope dropped");
        }
    }
}

fn terminator_len(bytes: &[u8]) -> usize {
    match bytes.last() {
        Some(&CR) | Some(&LF) => {
            if bytes.len() >= 2 {
                let prev = bytes[bytes.len() - 2];
                let last = bytes[bytes.len() - 1];
                if (prev == CR && last == LF) || (prev == LF && last == CR) {
                    return 2;
                }
            }
            1
        }
        _ => 0,
    }
}

/// Classifies a complete text candidate (terminator excluded) per §4.3.3's
/// priority: `P2SystemInit` before generic `CogMessage`, then window
/// commands, then the terminal-output catch-all.
///
/// `P2SystemInit` is a strict byte-for-byte compare against the golden-sync
/// marker, independent of the generic `CogMessage` two-space rule — the
/// marker text itself has only a single space after the cog digit, so it
/// would never satisfy that rule and must be matched first, on its own terms.
fn classify_text(content: &[u8], names: &crate::router::NameTable) -> MessageType {
    if content == P2_SYSTEM_INIT_TEXT {
        return MessageType::P2SystemInit;
    }

    if content.len() >= 4 && &content[0..3] == b"Cog" && content[3].is_ascii_digit() {
        let cog_digit = content[3] - b'0';
        let two_spaces = content.len() >= 6 && content[4] == b' ' && content[5] == b' ';
        if cog_digit <= 7 && two_spaces {
            return MessageType::CogMessage { cog: cog_digit };
        }
        return MessageType::InvalidCog { cog: cog_digit };
    }

    if content.first() == Some(&WINDOW_COMMAND_START) {
        let rest = &content[1..];
        let token_end = rest.iter().position(|b| b.is_ascii_whitespace()).unwrap_or(rest.len());
        let token = &rest[..token_end];
        let lower: Vec<u8> = token.iter().map(u8::to_ascii_lowercase).collect();
        return match WindowKind::from_token(&lower) {
            Some(kind) => MessageType::WindowCreateOrUpdate { kind },
            None => {
                let name = String::from_utf8_lossy(token);
                MessageType::WindowUpdateNamed { name: names.intern(&name) }
            }
        };
    }

    MessageType::TerminalOutput
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::mailbox::Mailbox;
    use crate::router::{NullEventListener, RouteTable};

    fn harness(config: CoreConfig) -> (Arc<Extractor>, Arc<ByteRing>, Arc<SlotPool>, Arc<RouteTable>, Arc<Mailbox<RouterEnvelope>>) {
        let ring = Arc::new(ByteRing::new(config.ring_capacity()));
        let pool = Arc::new(SlotPool::new(&config));
        let table = Arc::new(RouteTable::new());
        let mailbox = Arc::new(Mailbox::new(config.mailbox_capacity()));
        let stats = Arc::new(Stats::new());
        let extractor = Arc::new(Extractor::new(
            ring.clone(),
            pool.clone(),
            table.clone(),
            mailbox.clone(),
            stats,
            Arc::new(NullEventListener),
            config,
        ));
        (extractor, ring, pool, table, mailbox)
    }

    #[test]
    fn cog_message_passthrough() {
        let (extractor, ring, _pool, table, mailbox) = harness(CoreConfig::default());
        table.register_sink(MessageType::CogMessage { cog: 3 }, Box::new(|_| {}));
        ring.append(b"Cog3  hello\r\n");

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("one envelope dispatched");
        assert_eq!(envelope.message_type, MessageType::CogMessage { cog: 3 });
    }

    #[test]
    fn golden_sync_marker_is_classified_as_p2_system_init() {
        let (extractor, ring, _pool, _table, mailbox) = harness(CoreConfig::default());
        ring.append(b"Cog0 INIT $0000_0000 $0000_0000 load\n");

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(envelope.message_type, MessageType::P2SystemInit);
    }

    #[test]
    fn binary_debug_packet_round_trip() {
        let (extractor, ring, pool, _table, mailbox) = harness(CoreConfig::default());
        ring.append(&[0xDB, 0x03, 0x00, 0x41, 0x42, 0x43]);

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(envelope.message_type, MessageType::BinaryDebugPacket);
        let handle = pool.read(envelope.slot_id);
        assert_eq!(handle.data(), &[0xDB, 0x03, 0x00, 0x41, 0x42, 0x43]);
        pool.release(envelope.slot_id);
    }

    #[test]
    fn corrupt_binary_length_discards_header_byte_and_resumes() {
        let (extractor, ring, _pool, _table, mailbox) = harness(CoreConfig::default());
        ring.append(&[0xDB, 0x00, 0x80]);
        ring.append(b"Cog1  x\r\n");

        assert!(matches!(extractor.try_extract_one(), Outcome::Progressed));
        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(envelope.message_type, MessageType::CogMessage { cog: 1 });
    }

    #[test]
    fn debugger_frame_then_zero_tail_then_cog_message() {
        let (extractor, ring, _pool, table, mailbox) = harness(CoreConfig::default());
        table.register_sink(MessageType::DebuggerFrame { cog: 2 }, Box::new(|_| {}));
        let mut frame = vec![0x02u8];
        frame.extend(std::iter::repeat(0xAAu8).take(415));
        ring.append(&frame);
        ring.append(&[0u8; 12]);
        ring.append(b"Cog2  ok\r");

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("debugger frame dispatched");
        assert_eq!(envelope.message_type, MessageType::DebuggerFrame { cog: 2 });
        assert_eq!(ring.available(), 9, "the 12 zero bytes were silently absorbed");
    }

    #[test]
    fn embedded_cr_in_window_payload_is_not_a_terminator() {
        let (extractor, ring, _pool, _table, mailbox) = harness(CoreConfig::default());
        ring.append(b"`bitmap myname data\rmore\r\n");

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(
            envelope.message_type,
            MessageType::WindowCreateOrUpdate { kind: WindowKind::Bitmap }
        );
    }

    #[test]
    fn unknown_window_token_is_named_update() {
        let (extractor, ring, _pool, table, mailbox) = harness(CoreConfig::default());
        ring.append(b"`mycustomwindow payload\n");

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        match envelope.message_type {
            MessageType::WindowUpdateNamed { name } => {
                assert_eq!(table.names().resolve(name), "mycustomwindow");
            }
            other => panic!("expected WindowUpdateNamed, got {other:?}"),
        }
    }

    #[test]
    fn invalid_cog_digit_out_of_range() {
        let (extractor, ring, _pool, _table, mailbox) = harness(CoreConfig::default());
        ring.append(b"Cog9  oops\n");

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(envelope.message_type, MessageType::InvalidCog { cog: 9 });
    }

    #[test]
    fn empty_ring_is_incomplete() {
        let (extractor, _ring, _pool, _table, _mailbox) = harness(CoreConfig::default());
        assert!(matches!(extractor.try_extract_one(), Outcome::Incomplete));
    }

    #[test]
    fn text_message_at_exactly_max_length_including_terminator_is_accepted() {
        let config = CoreConfig::default();
        let (extractor, ring, _pool, _table, mailbox) = harness(config);
        let mut bytes = vec![b'x'; config.max_text_length - 1];
        bytes.push(LF);
        assert_eq!(bytes.len(), config.max_text_length);
        ring.append(&bytes);

        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(envelope.message_type, MessageType::TerminalOutput);
    }

    #[test]
    fn text_message_one_byte_over_max_length_is_abandoned_not_accepted() {
        let config = CoreConfig::default();
        let (extractor, ring, _pool, _table, mailbox) = harness(config);
        let mut bytes = vec![b'x'; config.max_text_length];
        bytes.push(LF);
        assert_eq!(bytes.len(), config.max_text_length + 1);
        ring.append(&bytes);

        // The terminator only completes the message at max_text_length + 1,
        // past the cap, so it's never recognized as a match; the candidate
        // is instead force-abandoned as a truncated message, leaving the
        // trailing terminator byte unconsumed rather than being accepted as
        // part of a 65537-byte message.
        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(envelope.message_type, MessageType::TerminalOutput);
        assert_eq!(ring.available(), 1, "the terminator byte was left behind, not folded into the abandoned message");
    }

    #[test]
    fn sink_registered_for_one_cog_never_observes_another_cogs_traffic() {
        let (extractor, ring, _pool, table, mailbox) = harness(CoreConfig::default());
        table.register_sink(MessageType::CogMessage { cog: 3 }, Box::new(|_| {}));

        ring.append(b"Cog1  hello\r\n");
        assert!(matches!(extractor.try_extract_one(), Outcome::Emitted));
        let envelope = mailbox.try_recv().expect("dispatched");
        assert_eq!(envelope.message_type, MessageType::CogMessage { cog: 1 });
        assert_eq!(
            table.fanout_count(MessageType::CogMessage { cog: 1 }),
            0,
            "the COG-3 sink must not be counted as a recipient of COG-1 traffic"
        );
    }
}
