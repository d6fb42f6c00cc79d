//! Framing, parsing and response reader tests

use printcontrol_communication::communication::ResponseReader;
use printcontrol_communication::firmware::marlin::{checksum, decode, encode, verify};
use printcontrol_communication::{AckGate, ResponseParser, SerialChannel, VirtualPort};
use printcontrol_core::{DriverEvent, EventDispatcher};
use proptest::prelude::*;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_encode_known_frame() {
    let frame = encode(1, "G1 X10").unwrap();
    let expected = format!("N1 G1 X10*{}\n", checksum(b"N1 G1 X10"));
    assert_eq!(frame, expected.into_bytes());
    assert!(verify(&frame));
}

#[test]
fn test_encode_strips_comment_and_whitespace() {
    let frame = encode(7, "  M104 S200 ; heat  ").unwrap();
    let decoded = decode(&frame).unwrap();
    assert_eq!(decoded.seq, 7);
    assert_eq!(decoded.content, "M104 S200");
    assert!(decoded.valid);
}

#[test]
fn test_reader_turns_acks_into_credits() {
    let (host, mut device) = VirtualPort::pair();
    let channel = Arc::new(SerialChannel::from_link("virtual", host.reader, host.writer));
    let gate = Arc::new(AckGate::new());
    let events = EventDispatcher::default();
    let mut rx = events.subscribe();

    let reader = ResponseReader::spawn(channel.clone(), gate.clone(), events).unwrap();
    device
        .writer
        .write_all(b"ok\nok T:20.0 /0.0\necho:cold extrusion prevented\nok\n")
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while gate.count() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(gate.count(), 3);
    assert_eq!(
        rx.try_recv().unwrap(),
        DriverEvent::Echo("cold extrusion prevented".to_string())
    );

    drop(device);
    reader.join();
    assert!(!channel.is_open());
    assert_eq!(gate.count(), 0);
    assert!(matches!(rx.try_recv().unwrap(), DriverEvent::ReaderStopped(_)));
}

#[test]
fn test_reader_discards_overlong_lines() {
    let (host, mut device) = VirtualPort::pair();
    let channel = Arc::new(SerialChannel::from_link("virtual", host.reader, host.writer));
    let gate = Arc::new(AckGate::new());
    let reader = ResponseReader::spawn(channel, gate.clone(), EventDispatcher::default()).unwrap();

    let mut long_line = vec![b'o'; 5000];
    long_line.extend_from_slice(b"k ok\nok\n");
    device.writer.write_all(&long_line).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while gate.count() < 1 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(gate.count(), 1);

    drop(device);
    reader.join();
}

proptest! {
    #[test]
    fn prop_encode_none_only_for_empty_content(line in "[ -~]{0,40}") {
        let content = line.split(';').next().unwrap_or("").trim();
        prop_assert_eq!(encode(1, &line).is_none(), content.is_empty());
    }

    #[test]
    fn prop_encoded_frames_verify(seq in 1u32..100_000, cmd in "[A-Z][0-9]{1,3}( [A-Z]-?[0-9]{1,4}(\\.[0-9]{1,3})?){0,4}") {
        let frame = encode(seq, &cmd).unwrap();
        prop_assert!(verify(&frame));
        let decoded = decode(&frame).unwrap();
        prop_assert_eq!(decoded.seq, seq);
        prop_assert_eq!(decoded.content, cmd);
    }

    #[test]
    fn prop_parser_never_panics(line in "\\PC{0,80}") {
        let event = ResponseParser::new().parse(&line);
        if !line.contains(':') {
            prop_assert!(event.echo_text.is_none());
        }
    }
}
