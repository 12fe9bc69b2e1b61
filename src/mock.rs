/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! In-memory resource manager
//!
//! Instruments answer `*IDN?` and a fixed set of commands. The manager keeps
//! count of open sessions so tests can check that sessions are released.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::error::TransportError;
use crate::identity::IDENTITY_QUERY;
use crate::transport::{Address, ResourceManager, Session};

#[derive(Debug, Clone)]
pub struct MockInstrument {
    address: Address,
    identity: Option<String>,
    responses: Vec<(String, Vec<u8>)>,
    refuse_open: bool,
}

impl MockInstrument {
    pub fn new<A: Into<Address>>(address: A, identity: &str) -> MockInstrument {
        MockInstrument {
            address: address.into(),
            identity: Some(identity.to_string()),
            responses: Vec::new(),
            refuse_open: false,
        }
    }

    /// Accepts connections but never answers the identity query
    pub fn silent<A: Into<Address>>(address: A) -> MockInstrument {
        MockInstrument {
            identity: None,
            ..MockInstrument::new(address, "")
        }
    }

    pub fn refuse_open(mut self) -> MockInstrument {
        self.refuse_open = true;
        self
    }

    /// Answer `command` with `response`
    pub fn respond(mut self, command: &str, response: &[u8]) -> MockInstrument {
        self.responses.push((command.to_string(), response.to_vec()));
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// Session bookkeeping shared by a [`MockBus`] and its sessions
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub opened: usize,
    pub closed: usize,
    pub open_now: usize,
    pub max_open: usize,
    /// Every command written, with the address it went to
    pub commands: Vec<(Address, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct MockBus {
    instruments: Vec<MockInstrument>,
    unavailable: bool,
    stats: Rc<RefCell<Stats>>,
}

impl MockBus {
    pub fn new() -> MockBus {
        MockBus::default()
    }

    pub fn with(mut self, instrument: MockInstrument) -> MockBus {
        self.instruments.push(instrument);
        self
    }

    /// Listing resources fails, as if the resource manager were missing
    pub fn unavailable(mut self) -> MockBus {
        self.unavailable = true;
        self
    }

    pub fn stats(&self) -> Stats {
        self.stats.borrow().clone()
    }

    /// Commands sent to `address`, in order
    pub fn commands_to(&self, address: &str) -> Vec<String> {
        self.stats
            .borrow()
            .commands
            .iter()
            .filter(|(a, _)| a.as_str() == address)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl ResourceManager for MockBus {
    fn handles(&self, _address: &Address) -> bool {
        true
    }

    fn list_resources(&self) -> Result<Vec<Address>, TransportError> {
        if self.unavailable {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no resource manager",
            )));
        }
        Ok(self.instruments.iter().map(|i| i.address.clone()).collect())
    }

    fn open(
        &self,
        address: &Address,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let instrument = self
            .instruments
            .iter()
            .find(|i| &i.address == address)
            .ok_or_else(|| TransportError::NotFound(address.to_string()))?;

        if instrument.refuse_open {
            return Err(TransportError::Request);
        }

        {
            let mut stats = self.stats.borrow_mut();
            stats.opened += 1;
            stats.open_now += 1;
            stats.max_open = stats.max_open.max(stats.open_now);
        }

        Ok(Box::new(MockSession {
            instrument: instrument.clone(),
            pending: None,
            closed: false,
            stats: Rc::clone(&self.stats),
        }))
    }
}

/// Not closed on drop, so a leaked session shows up in [`Stats::open_now`]
pub struct MockSession {
    instrument: MockInstrument,
    pending: Option<Vec<u8>>,
    closed: bool,
    stats: Rc<RefCell<Stats>>,
}

impl Session for MockSession {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }
        self.stats
            .borrow_mut()
            .commands
            .push((self.instrument.address.clone(), command.to_string()));

        self.pending = if command == IDENTITY_QUERY {
            self.instrument
                .identity
                .as_ref()
                .map(|idn| format!("{}\n", idn).into_bytes())
        } else {
            self.instrument
                .responses
                .iter()
                .find(|(c, _)| c == command)
                .map(|(_, r)| r.clone())
        };
        Ok(())
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::NotConnected);
        }
        self.pending.take().ok_or(TransportError::Timeout)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            let mut stats = self.stats.borrow_mut();
            stats.closed += 1;
            stats.open_now -= 1;
        }
        Ok(())
    }
}
