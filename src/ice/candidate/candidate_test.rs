use super::*;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn test_host_priority() {
    // 126 << 24 | 65535 << 8 | 255 for component 1.
    assert_eq!(priority(CandidateType::Host, 1), 2_130_706_431);
}

#[test]
fn test_type_preference_ordering() {
    let host = priority(CandidateType::Host, 1);
    let prflx = priority(CandidateType::PeerReflexive, 1);
    let srflx = priority(CandidateType::ServerReflexive, 1);
    let relay = priority(CandidateType::Relay, 1);
    assert!(host > prflx && prflx > srflx && srflx > relay);
}

#[test]
fn test_pair_priority_formula() {
    // G=100, D=200: 2^32*100 + 2*200 + 0
    assert_eq!(pair_priority(100, 200), (1u64 << 32) * 100 + 400);
    // G=200, D=100: 2^32*100 + 2*200 + 1
    assert_eq!(pair_priority(200, 100), (1u64 << 32) * 100 + 401);
    // Deterministic for equal inputs.
    assert_eq!(pair_priority(5, 5), pair_priority(5, 5));
}

#[test]
fn test_pair_priority_symmetry_property() {
    // Reversing the roles of the same two candidates changes the result
    // by at most the tie-break bit.
    let a = pair_priority(700, 300);
    let b = pair_priority(300, 700);
    assert_eq!(a - 1, b);
}

#[test]
fn test_foundation_groups_same_base() {
    let base = addr("10.0.0.1:1000");
    let a = Candidate::new(CandidateType::Host, base, base, None, 0);
    let b = Candidate::new(CandidateType::Host, addr("10.0.0.1:2000"), base, None, 0);
    assert_eq!(a.foundation, b.foundation);

    let srflx = Candidate::new(
        CandidateType::ServerReflexive,
        addr("203.0.113.9:5000"),
        base,
        Some(base),
        0,
    );
    assert_ne!(a.foundation, srflx.foundation);
}

#[test]
fn test_description_round_trip() {
    let base = addr("10.0.0.1:1000");
    let c = Candidate::new(
        CandidateType::ServerReflexive,
        addr("203.0.113.9:5000"),
        base,
        Some(base),
        2,
    );
    let parsed = Candidate::from_description(&c.to_description(), 2).unwrap();
    assert_eq!(parsed, c);
}
