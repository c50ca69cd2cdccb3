use super::*;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

struct TestNet {
    a: Agent,
    b: Agent,
    addr_a: SocketAddr,
    addr_b: SocketAddr,
    now: Instant,
}

impl TestNet {
    fn new() -> Self {
        TestNet {
            a: Agent::new(IceRole::Controlling, vec![], None),
            b: Agent::new(IceRole::Controlled, vec![], None),
            addr_a: addr("10.0.0.1:11111"),
            addr_b: addr("10.0.0.2:22222"),
            now: Instant::now(),
        }
    }

    fn wire_up(&mut self) {
        let creds_a = self.a.local_credentials().clone();
        let creds_b = self.b.local_credentials().clone();
        self.a.set_remote_credentials(&creds_b.ufrag, &creds_b.pwd);
        self.b.set_remote_credentials(&creds_a.ufrag, &creds_a.pwd);

        self.a.start_gathering(self.now, self.addr_a);
        self.b.start_gathering(self.now, self.addr_b);
        self.exchange_candidates();
        self.a.start_checks(self.now);
        self.b.start_checks(self.now);
    }

    fn exchange_candidates(&mut self) {
        let mut a_descs = vec![];
        while let Some(e) = self.a.poll_event() {
            if let AgentEvent::CandidateGathered(d) = e {
                a_descs.push(d);
            }
        }
        let mut b_descs = vec![];
        while let Some(e) = self.b.poll_event() {
            if let AgentEvent::CandidateGathered(d) = e {
                b_descs.push(d);
            }
        }
        for d in a_descs {
            self.b.add_remote_candidate(&d).unwrap();
        }
        for d in b_descs {
            self.a.add_remote_candidate(&d).unwrap();
        }
    }

    fn pump(&mut self) {
        loop {
            let mut progressed = false;
            while let Some(t) = self.a.poll_transmit() {
                assert_eq!(t.destination, self.addr_b);
                self.b.handle_receive(self.now, self.addr_a, &t.message);
                progressed = true;
            }
            while let Some(t) = self.b.poll_transmit() {
                assert_eq!(t.destination, self.addr_a);
                self.a.handle_receive(self.now, self.addr_b, &t.message);
                progressed = true;
            }
            if !progressed {
                return;
            }
        }
    }

    fn run_until_completed(&mut self) {
        for _ in 0..200 {
            self.a.handle_timeout(self.now);
            self.b.handle_timeout(self.now);
            self.pump();
            if self.a.state() == IceConnectionState::Completed
                && self.b.state() == IceConnectionState::Completed
            {
                return;
            }
            self.now += Duration::from_millis(50);
        }
        panic!(
            "agents never completed: a={:?} b={:?}",
            self.a.state(),
            self.b.state()
        );
    }
}

#[test]
fn test_connectivity_and_nomination() {
    let mut net = TestNet::new();
    net.wire_up();
    net.run_until_completed();

    assert!(net.a.has_data_path());
    assert!(net.b.has_data_path());

    let mut a_selected = false;
    while let Some(e) = net.a.poll_event() {
        if let AgentEvent::SelectedPair {
            remote, generation, ..
        } = e
        {
            assert_eq!(remote, net.addr_b);
            assert_eq!(generation, 0);
            a_selected = true;
        }
    }
    assert!(a_selected, "controlling agent must report a selected pair");
}

#[test]
fn test_gathering_without_servers_completes() {
    let mut a = Agent::new(IceRole::Controlling, vec![], None);
    let now = Instant::now();
    a.start_gathering(now, addr("10.0.0.1:1000"));
    let mut got_host = false;
    let mut got_complete = false;
    while let Some(e) = a.poll_event() {
        match e {
            AgentEvent::CandidateGathered(d) => {
                assert_eq!(d.typ, "host");
                got_host = true;
            }
            AgentEvent::GatheringComplete => got_complete = true,
            _ => {}
        }
    }
    assert!(got_host && got_complete);
}

#[test]
fn test_role_conflict_resolves() {
    let mut net = TestNet::new();
    // Misconfigure both sides as controlling.
    net.b = Agent::new(IceRole::Controlling, vec![], None);
    net.wire_up();
    net.run_until_completed();
    // Exactly one side ended controlling.
    assert_ne!(net.a.role(), net.b.role());
}

#[test]
fn test_restart_generates_fresh_credentials() {
    let mut net = TestNet::new();
    net.wire_up();
    net.run_until_completed();

    let before = net.a.local_credentials().clone();
    let after = net.a.restart();
    assert_ne!(before.ufrag, after.ufrag);
    assert_ne!(before.pwd, after.pwd);
    assert_eq!(net.a.generation(), 1);
    // The old data path keeps working until the new generation nominates.
    assert!(net.a.has_data_path());
}

#[test]
fn test_restart_renominated_on_new_generation() {
    let mut net = TestNet::new();
    net.wire_up();
    net.run_until_completed();
    while net.a.poll_event().is_some() {}
    while net.b.poll_event().is_some() {}

    let new_creds = net.a.restart();
    let b_creds = net.b.restart();
    net.a.set_remote_credentials(&b_creds.ufrag, &b_creds.pwd);
    net.b.set_remote_credentials(&new_creds.ufrag, &new_creds.pwd);
    net.a.start_gathering(net.now, net.addr_a);
    net.b.start_gathering(net.now, net.addr_b);
    net.exchange_candidates();
    net.a.start_checks(net.now);
    net.b.start_checks(net.now);
    net.run_until_completed();

    let mut saw_new_generation = false;
    while let Some(e) = net.a.poll_event() {
        if let AgentEvent::SelectedPair { generation, .. } = e {
            assert_eq!(generation, 1);
            saw_new_generation = true;
        }
    }
    assert!(saw_new_generation, "restart must nominate on generation 1");
}

#[test]
fn test_checks_wait_for_credentials() {
    let mut a = Agent::new(IceRole::Controlling, vec![], None);
    let now = Instant::now();
    a.start_gathering(now, addr("10.0.0.1:1000"));
    a.add_remote_candidate(&sdp::CandidateDescription {
        foundation: "f".into(),
        component: 1,
        transport: "udp".into(),
        priority: 100,
        address: "10.0.0.2".parse().unwrap(),
        port: 2000,
        typ: "host".into(),
        related_address: None,
        related_port: None,
    })
    .unwrap();
    a.start_checks(now);
    a.handle_timeout(now);
    // No credentials, no checks on the wire beyond gathering.
    while let Some(t) = a.poll_transmit() {
        let m = Message::decode(&t.message).unwrap();
        assert_ne!(m.typ, BINDING_REQUEST);
    }
}
