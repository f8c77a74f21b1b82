use crate::error::{NetError, NetResult};
use rand::Rng;
use std::ops::RangeInclusive;

/// Accepted length of a user-supplied domain id.
pub const DOMAIN_ID_LENGTH: RangeInclusive<usize> = 2..=127;

/// Length of generated domain ids and run ids.
pub const DEFAULT_RANDOM_ID_LENGTH: usize = 10;

// No "l", "o", "I" or "O": they read too much like 0 and 1.
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Identity and counters shared by every node created in one net.
#[derive(Debug, Clone)]
pub struct Domain {
    id: String,
    random_run_id: String,
    node_uid_counter: u64,
    node_run_id_counter: u64,
}

impl Domain {
    /// Domain with a random id.
    pub fn new() -> Self {
        Self::from_parts(random_string(DEFAULT_RANDOM_ID_LENGTH))
    }

    pub fn with_id(id: impl Into<String>) -> NetResult<Self> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self::from_parts(id))
    }

    /// Domain with a random id of the given length.
    pub fn with_random_id(length: usize) -> NetResult<Self> {
        if !DOMAIN_ID_LENGTH.contains(&length) {
            return Err(NetError::InvalidDomainId(length));
        }
        Ok(Self::from_parts(random_string(length)))
    }

    fn from_parts(id: String) -> Self {
        Self {
            id,
            random_run_id: random_string(DEFAULT_RANDOM_ID_LENGTH),
            node_uid_counter: 0,
            node_run_id_counter: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> NetResult<()> {
        let id = id.into();
        validate_id(&id)?;
        self.id = id;
        Ok(())
    }

    /// Fixed for the lifetime of this domain value.
    pub fn random_run_id(&self) -> &str {
        &self.random_run_id
    }

    pub(crate) fn next_node_uid(&mut self) -> u64 {
        let uid = self.node_uid_counter;
        self.node_uid_counter += 1;
        uid
    }

    pub(crate) fn next_run_id(&mut self) -> u64 {
        let run_id = self.node_run_id_counter;
        self.node_run_id_counter += 1;
        run_id
    }

    pub fn node_uid_counter(&self) -> u64 {
        self.node_uid_counter
    }

    pub fn node_run_id_counter(&self) -> u64 {
        self.node_run_id_counter
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_id(id: &str) -> NetResult<()> {
    let len = id.chars().count();
    if !DOMAIN_ID_LENGTH.contains(&len) {
        return Err(NetError::InvalidDomainId(len));
    }
    Ok(())
}

/// Random string drawn from an alphabet without look-alike characters.
pub fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
