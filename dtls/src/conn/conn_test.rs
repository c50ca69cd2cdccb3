use super::*;
use crate::crypto::Certificate;

fn config() -> Config {
    Config::new(Certificate::generate_self_signed().unwrap())
}

fn pinned_pair() -> (DtlsConn, DtlsConn) {
    let client_cert = Certificate::generate_self_signed().unwrap();
    let server_cert = Certificate::generate_self_signed().unwrap();
    let mut client_config = Config::new(client_cert.clone());
    client_config.remote_fingerprint = Some(server_cert.fingerprint());
    let mut server_config = Config::new(server_cert);
    server_config.remote_fingerprint = Some(client_cert.fingerprint());
    (
        DtlsConn::new(client_config, DtlsRole::Client),
        DtlsConn::new(server_config, DtlsRole::Server),
    )
}

fn pump(client: &mut DtlsConn, server: &mut DtlsConn, now: Instant) {
    loop {
        let mut progressed = false;
        while let Some(datagram) = client.poll_transmit() {
            server.handle_receive(&datagram, now).unwrap();
            progressed = true;
        }
        while let Some(datagram) = server.poll_transmit() {
            client.handle_receive(&datagram, now).unwrap();
            progressed = true;
        }
        if !progressed {
            return;
        }
    }
}

fn drain_events(conn: &mut DtlsConn) -> Vec<DtlsEvent> {
    let mut out = vec![];
    while let Some(e) = conn.poll_event() {
        out.push(e);
    }
    out
}

#[test]
fn test_full_handshake() {
    let (mut client, mut server) = pinned_pair();
    let now = Instant::now();
    client.start_handshake(now).unwrap();
    pump(&mut client, &mut server, now);

    assert!(client.is_handshake_complete());
    assert!(server.is_handshake_complete());

    let client_events = drain_events(&mut client);
    assert!(client_events
        .iter()
        .any(|e| matches!(e, DtlsEvent::PeerCertificate(_))));
    assert!(client_events
        .iter()
        .any(|e| matches!(e, DtlsEvent::HandshakeComplete { .. })));
    let server_events = drain_events(&mut server);
    assert!(server_events
        .iter()
        .any(|e| matches!(e, DtlsEvent::HandshakeComplete { .. })));

    // Both ends derive identical exporter output.
    let a = client.export_keying_material(b"EXTRACTOR-dtls_srtp", 60).unwrap();
    let b = server.export_keying_material(b"EXTRACTOR-dtls_srtp", 60).unwrap();
    assert_eq!(a, b);

    // SRTP material is mirrored between the roles.
    let ck = client.export_srtp_keying_material().unwrap();
    let sk = server.export_srtp_keying_material().unwrap();
    assert_eq!(ck.profile, sk.profile);
    assert_eq!(ck.local_master_key, sk.remote_master_key);
    assert_eq!(ck.remote_master_key, sk.local_master_key);
    assert_eq!(ck.local_master_salt, sk.remote_master_salt);
}

#[test]
fn test_application_data_both_directions() {
    let (mut client, mut server) = pinned_pair();
    let now = Instant::now();
    client.start_handshake(now).unwrap();
    pump(&mut client, &mut server, now);
    drain_events(&mut client);
    drain_events(&mut server);

    client.write(b"ping from client").unwrap();
    pump(&mut client, &mut server, now);
    let events = drain_events(&mut server);
    assert_eq!(
        events,
        vec![DtlsEvent::ApplicationData(b"ping from client".to_vec())]
    );

    server.write(b"pong from server").unwrap();
    pump(&mut client, &mut server, now);
    let events = drain_events(&mut client);
    assert_eq!(
        events,
        vec![DtlsEvent::ApplicationData(b"pong from server".to_vec())]
    );
}

#[test]
fn test_fingerprint_mismatch_is_fatal() {
    let mut client_config = config();
    // Pin a fingerprint that cannot match the server's certificate.
    client_config.remote_fingerprint = Some(
        Certificate::generate_self_signed().unwrap().fingerprint(),
    );
    let mut client = DtlsConn::new(client_config, DtlsRole::Client);
    let mut server = DtlsConn::new(config(), DtlsRole::Server);

    let now = Instant::now();
    client.start_handshake(now).unwrap();

    let mut failed = false;
    'outer: for _ in 0..10 {
        while let Some(d) = client.poll_transmit() {
            server.handle_receive(&d, now).unwrap();
        }
        while let Some(d) = server.poll_transmit() {
            if let Err(e) = client.handle_receive(&d, now) {
                assert_eq!(e, Error::CertificateVerifyFailed);
                failed = true;
                break 'outer;
            }
        }
    }
    assert!(failed, "handshake should have failed on fingerprint mismatch");
    assert!(!client.is_handshake_complete());
}

#[test]
fn test_retransmit_on_timeout() {
    let (mut client, _server) = pinned_pair();
    let now = Instant::now();
    client.start_handshake(now).unwrap();
    // Drop the initial flight.
    while client.poll_transmit().is_some() {}

    let timeout = client.poll_timeout().unwrap();
    client.handle_timeout(timeout).unwrap();
    let resent = client.poll_transmit();
    assert!(resent.is_some(), "flight must be retransmitted");
    // Backoff doubles the interval.
    assert!(client.poll_timeout().unwrap() > timeout);
}

#[test]
fn test_handshake_deadline() {
    let (mut client, _server) = pinned_pair();
    let now = Instant::now();
    client.start_handshake(now).unwrap();
    let err = client
        .handle_timeout(now + Duration::from_secs(31))
        .unwrap_err();
    assert_eq!(err, Error::HandshakeTimeout);
}

#[test]
fn test_lost_final_flight_is_answered() {
    // If the server's CCS+Finished is lost, the client's retransmitted
    // flight must trigger a server resend.
    let (mut client, mut server) = pinned_pair();
    let now = Instant::now();
    client.start_handshake(now).unwrap();

    // Run the handshake but drop everything the server sends after it
    // completes (its final flight).
    for _ in 0..10 {
        while let Some(d) = client.poll_transmit() {
            server.handle_receive(&d, now).unwrap();
        }
        if server.is_handshake_complete() {
            break;
        }
        while let Some(d) = server.poll_transmit() {
            client.handle_receive(&d, now).unwrap();
        }
    }
    assert!(server.is_handshake_complete());
    while server.poll_transmit().is_some() {}
    assert!(!client.is_handshake_complete());

    // Client times out and retransmits its flight; the server answers with
    // its saved final flight and the client completes.
    let timeout = client.poll_timeout().unwrap();
    client.handle_timeout(timeout).unwrap();
    pump(&mut client, &mut server, timeout);
    assert!(client.is_handshake_complete());
}

#[test]
fn test_write_before_established_rejected() {
    let (mut client, _server) = pinned_pair();
    assert_eq!(client.write(b"too early").unwrap_err(), Error::Closed);
}
