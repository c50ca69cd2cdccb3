use super::*;

fn pair() -> (Association, Association) {
    (
        Association::new(Config::default()),
        Association::new(Config::default()),
    )
}

fn pump(a: &mut Association, b: &mut Association, now: Instant) {
    loop {
        let mut progressed = false;
        while let Some(p) = a.poll_transmit() {
            b.handle_receive(&p, now).unwrap();
            progressed = true;
        }
        while let Some(p) = b.poll_transmit() {
            a.handle_receive(&p, now).unwrap();
            progressed = true;
        }
        if !progressed {
            return;
        }
    }
}

fn events(a: &mut Association) -> Vec<AssociationEvent> {
    let mut out = vec![];
    while let Some(e) = a.poll_event() {
        out.push(e);
    }
    out
}

fn establish(a: &mut Association, b: &mut Association, now: Instant) {
    a.connect(now);
    pump(a, b, now);
    assert!(a.is_established());
    assert!(b.is_established());
    assert!(events(a).contains(&AssociationEvent::Connected));
    assert!(events(b).contains(&AssociationEvent::Connected));
}

#[test]
fn test_four_way_handshake() {
    let (mut a, mut b) = pair();
    establish(&mut a, &mut b, Instant::now());
}

#[test]
fn test_ordered_message_delivery() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.send(1, 51, false, Reliability::Reliable, b"first", now).unwrap();
    a.send(1, 51, false, Reliability::Reliable, b"second", now).unwrap();
    pump(&mut a, &mut b, now);

    let got: Vec<_> = events(&mut b)
        .into_iter()
        .filter_map(|e| match e {
            AssociationEvent::Data { payload, ppid, .. } => Some((ppid, payload)),
            _ => None,
        })
        .collect();
    assert_eq!(got.len(), 2);
    assert_eq!(&got[0].1[..], b"first");
    assert_eq!(got[0].0, 51);
    assert_eq!(&got[1].1[..], b"second");
}

#[test]
fn test_large_message_fragmented() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    let big = vec![0x5au8; 10_000];
    a.send(3, 53, false, Reliability::Reliable, &big, now).unwrap();
    pump(&mut a, &mut b, now);

    let got = events(&mut b);
    let payloads: Vec<_> = got
        .iter()
        .filter_map(|e| match e {
            AssociationEvent::Data { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].len(), 10_000);
    assert!(payloads[0].iter().all(|&b| b == 0x5a));
}

#[test]
fn test_lost_packet_retransmitted_on_t3() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.send(1, 51, false, Reliability::Reliable, b"will be lost", now).unwrap();
    // Drop the DATA packet.
    while a.poll_transmit().is_some() {}

    let timeout = a.poll_timeout().unwrap();
    a.handle_timeout(timeout).unwrap();
    pump(&mut a, &mut b, timeout);

    let got = events(&mut b);
    assert!(got.iter().any(|e| matches!(
        e,
        AssociationEvent::Data { payload, .. } if &payload[..] == b"will be lost"
    )));
}

#[test]
fn test_unordered_delivery() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.send(1, 51, true, Reliability::Reliable, b"unordered", now).unwrap();
    pump(&mut a, &mut b, now);
    let got = events(&mut b);
    assert!(got.iter().any(|e| matches!(
        e,
        AssociationEvent::Data { unordered: true, payload, .. } if &payload[..] == b"unordered"
    )));
}

#[test]
fn test_stream_reset_round_trip() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.reset_streams(&[1], now).unwrap();
    pump(&mut a, &mut b, now);

    assert!(events(&mut b)
        .contains(&AssociationEvent::IncomingStreamsReset { stream_ids: vec![1] }));
    assert!(events(&mut a)
        .contains(&AssociationEvent::OutgoingStreamsReset { stream_ids: vec![1] }));
}

#[test]
fn test_abandoned_message_skipped_via_forward_tsn() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.send(1, 51, false, Reliability::MaxRetransmits(0), b"lossy", now).unwrap();
    // First transmission lost.
    while a.poll_transmit().is_some() {}

    // T3 fires: retransmit budget (0) is exhausted, chunk abandoned, and
    // a FORWARD-TSN tells the peer to move on.
    let t3 = a.poll_timeout().unwrap();
    a.handle_timeout(t3).unwrap();
    pump(&mut a, &mut b, t3);

    // A later reliable message still arrives in order.
    a.send(1, 51, false, Reliability::Reliable, b"after", now).unwrap();
    pump(&mut a, &mut b, t3);
    let got = events(&mut b);
    assert!(got.iter().any(|e| matches!(
        e,
        AssociationEvent::Data { payload, .. } if &payload[..] == b"after"
    )));
    assert!(!got.iter().any(|e| matches!(
        e,
        AssociationEvent::Data { payload, .. } if &payload[..] == b"lossy"
    )));
}

#[test]
fn test_graceful_shutdown() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.close(now);
    pump(&mut a, &mut b, now);
    assert!(events(&mut a).contains(&AssociationEvent::Closed));
    assert!(events(&mut b).contains(&AssociationEvent::Closed));
}

#[test]
fn test_abort() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.abort();
    let p = a.poll_transmit().unwrap();
    assert_eq!(b.handle_receive(&p, now).unwrap_err(), Error::AbortReceived);
    assert!(events(&mut b).contains(&AssociationEvent::Closed));
}

#[test]
fn test_send_before_connect_queues() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    a.send(0, 50, false, Reliability::Reliable, b"early", now).unwrap();
    establish(&mut a, &mut b, now);
    pump(&mut a, &mut b, now);
    assert!(events(&mut b).iter().any(|e| matches!(
        e,
        AssociationEvent::Data { payload, .. } if &payload[..] == b"early"
    )));
}

#[test]
fn test_buffered_amount_drains_on_ack() {
    let (mut a, mut b) = pair();
    let now = Instant::now();
    establish(&mut a, &mut b, now);

    a.send(9, 51, false, Reliability::Reliable, &[0u8; 5000], now).unwrap();
    assert_eq!(a.buffered_amount(9), 5000);
    pump(&mut a, &mut b, now);
    // The tail of the transfer may sit behind a delayed SACK.
    for _ in 0..4 {
        if a.buffered_amount(9) == 0 {
            break;
        }
        let at = b.poll_timeout().unwrap();
        b.handle_timeout(at).unwrap();
        pump(&mut a, &mut b, at);
    }
    assert_eq!(a.buffered_amount(9), 0);
}

#[test]
fn test_message_too_large() {
    let (mut a, _b) = pair();
    let big = vec![0u8; DEFAULT_MAX_MESSAGE + 1];
    assert_eq!(
        a.send(0, 50, false, Reliability::Reliable, &big, Instant::now())
            .unwrap_err(),
        Error::MessageTooLarge
    );
}
