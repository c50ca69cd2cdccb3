#[cfg(test)]
mod textattrs_test;

use crate::attributes::*;
use crate::error::Error;
use crate::message::*;
use crate::Result;

const MAX_USERNAME: usize = 513;
const MAX_REALM: usize = 763;
const MAX_NONCE: usize = 763;
const MAX_SOFTWARE: usize = 763;

fn add_text(m: &mut Message, typ: AttrType, text: &str, max: usize) -> Result<()> {
    if text.len() > max {
        return Err(Error::AttributeTooLong { max });
    }
    m.append(typ, text.as_bytes())
}

fn get_text(m: &Message, typ: AttrType) -> Result<String> {
    let value = m.get(typ)?;
    String::from_utf8(value.to_vec()).map_err(|_| Error::BadAttributeFormat(typ.value()))
}

/// USERNAME. ICE connectivity checks carry `remote_ufrag:local_ufrag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(pub String);

impl Username {
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        add_text(m, ATTR_USERNAME, &self.0, MAX_USERNAME)
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        Ok(Username(get_text(m, ATTR_USERNAME)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm(pub String);

impl Realm {
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        add_text(m, ATTR_REALM, &self.0, MAX_REALM)
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        Ok(Realm(get_text(m, ATTR_REALM)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce(pub String);

impl Nonce {
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        add_text(m, ATTR_NONCE, &self.0, MAX_NONCE)
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        Ok(Nonce(get_text(m, ATTR_NONCE)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Software(pub String);

impl Software {
    pub fn add_to(&self, m: &mut Message) -> Result<()> {
        add_text(m, ATTR_SOFTWARE, &self.0, MAX_SOFTWARE)
    }

    pub fn get_from(m: &Message) -> Result<Self> {
        Ok(Software(get_text(m, ATTR_SOFTWARE)?))
    }
}
