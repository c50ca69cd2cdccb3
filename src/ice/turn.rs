use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use stun::addr::{XorPeerAddress, XorRelayedAddress};
use stun::attributes::{ATTR_DATA, ATTR_LIFETIME, ATTR_REQUESTED_TRANSPORT};
use stun::error_code::{ErrorCodeAttribute, CODE_UNAUTHORIZED};
use stun::integrity::MessageIntegrity;
use stun::message::*;
use stun::textattrs::{Nonce, Realm, Username};

use super::agent::Transmit;

const TRANSPORT_UDP: u8 = 17;

/// TURN server coordinates from the application's ICE server list.
#[derive(Debug, Clone)]
pub struct TurnServer {
    pub address: SocketAddr,
    pub username: String,
    pub credential: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocationState {
    Idle,
    Requested,
    Authenticating,
    Allocated,
}

/// Minimal TURN client (RFC 5766): one UDP allocation with long-term
/// credentials, permissions per remote peer, and Send/Data indication
/// relaying. Refresh and channel binding are not needed for the
/// connectivity checks' lifetime.
pub struct TurnClient {
    server: TurnServer,
    state: AllocationState,
    realm: Option<String>,
    nonce: Option<String>,
    pub relay_address: Option<SocketAddr>,
    permissions: HashSet<IpAddr>,
    inflight_allocate: Option<TransactionId>,
}

impl TurnClient {
    pub fn new(server: TurnServer) -> Self {
        TurnClient {
            server,
            state: AllocationState::Idle,
            realm: None,
            nonce: None,
            relay_address: None,
            permissions: HashSet::new(),
            inflight_allocate: None,
        }
    }

    pub fn server_address(&self) -> SocketAddr {
        self.server.address
    }

    pub fn is_allocated(&self) -> bool {
        self.state == AllocationState::Allocated
    }

    fn integrity(&self) -> Option<MessageIntegrity> {
        let realm = self.realm.as_deref()?;
        Some(MessageIntegrity::new_long_term(
            &self.server.username,
            realm,
            &self.server.credential,
        ))
    }

    fn allocate_request(&mut self, authenticated: bool) -> Option<Transmit> {
        let mut m = Message::new(MessageType::new(METHOD_ALLOCATE, MessageClass::Request));
        m.append(ATTR_REQUESTED_TRANSPORT, &[TRANSPORT_UDP, 0, 0, 0])
            .ok()?;
        m.append(ATTR_LIFETIME, &600u32.to_be_bytes()).ok()?;
        if authenticated {
            Username(self.server.username.clone()).add_to(&mut m).ok()?;
            Realm(self.realm.clone()?).add_to(&mut m).ok()?;
            Nonce(self.nonce.clone()?).add_to(&mut m).ok()?;
            self.integrity()?.add_to(&mut m).ok()?;
        }
        self.inflight_allocate = Some(m.transaction_id);
        Some(Transmit {
            destination: self.server.address,
            message: m.encode().to_vec(),
        })
    }

    /// Starts the allocation exchange.
    pub fn allocate(&mut self) -> Option<Transmit> {
        if self.state != AllocationState::Idle {
            return None;
        }
        self.state = AllocationState::Requested;
        self.allocate_request(false)
    }

    /// Installs a permission for a peer, once per IP.
    pub fn create_permission(&mut self, peer: SocketAddr) -> Option<Transmit> {
        if self.state != AllocationState::Allocated || !self.permissions.insert(peer.ip()) {
            return None;
        }
        let mut m = Message::new(MessageType::new(
            METHOD_CREATE_PERMISSION,
            MessageClass::Request,
        ));
        XorPeerAddress(peer).add_to(&mut m).ok()?;
        Username(self.server.username.clone()).add_to(&mut m).ok()?;
        Realm(self.realm.clone()?).add_to(&mut m).ok()?;
        Nonce(self.nonce.clone()?).add_to(&mut m).ok()?;
        self.integrity()?.add_to(&mut m).ok()?;
        Some(Transmit {
            destination: self.server.address,
            message: m.encode().to_vec(),
        })
    }

    /// Wraps application bytes destined to `peer` in a Send indication.
    pub fn send_indication(&self, peer: SocketAddr, data: &[u8]) -> Option<Transmit> {
        let mut m = Message::new(MessageType::new(METHOD_SEND, MessageClass::Indication));
        XorPeerAddress(peer).add_to(&mut m).ok()?;
        m.append(ATTR_DATA, data).ok()?;
        Some(Transmit {
            destination: self.server.address,
            message: m.encode().to_vec(),
        })
    }

    /// Unwraps a Data indication into `(peer, payload)`.
    pub fn parse_data_indication(m: &Message) -> Option<(SocketAddr, Vec<u8>)> {
        if m.typ != MessageType::new(METHOD_DATA, MessageClass::Indication) {
            return None;
        }
        let peer = XorPeerAddress::get_from(m).ok()?.0;
        let data = m.get(ATTR_DATA).ok()?.to_vec();
        Some((peer, data))
    }

    /// Feeds a STUN message that arrived from the TURN server. Returns a
    /// follow-up transmit when the exchange continues, plus the relay
    /// candidate address when allocation completes.
    pub fn handle_message(
        &mut self,
        m: &Message,
    ) -> (Option<Transmit>, Option<SocketAddr>) {
        if Some(m.transaction_id) != self.inflight_allocate {
            return (None, None);
        }
        self.inflight_allocate = None;
        match (m.typ.method, m.typ.class) {
            (METHOD_ALLOCATE, MessageClass::ErrorResponse) => {
                let Ok(code) = ErrorCodeAttribute::get_from(m) else {
                    return (None, None);
                };
                if code.code == CODE_UNAUTHORIZED && self.state == AllocationState::Requested
                {
                    self.realm = Realm::get_from(m).ok().map(|r| r.0);
                    self.nonce = Nonce::get_from(m).ok().map(|n| n.0);
                    self.state = AllocationState::Authenticating;
                    return (self.allocate_request(true), None);
                }
                (None, None)
            }
            (METHOD_ALLOCATE, MessageClass::SuccessResponse) => {
                let Ok(relayed) = XorRelayedAddress::get_from(m) else {
                    return (None, None);
                };
                self.state = AllocationState::Allocated;
                self.relay_address = Some(relayed.0);
                (None, Some(relayed.0))
            }
            _ => (None, None),
        }
    }
}
