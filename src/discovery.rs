/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Find the instrument to capture from
//!
//! Candidates are interrogated one after the other, each session is closed
//! before the next address is opened. The name hint only narrows the list of
//! addresses, resolution is the same with or without it.

use log::{debug, info, warn};
use std::time::Duration;

use crate::driver::{DriverDescriptor, Registry};
use crate::error::{Error, TransportError};
use crate::identity::{Identity, IDENTITY_QUERY};
use crate::transport::{Address, ResourceManager, ScopedSession};

/// An address that answered the identity query
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: Address,
    pub identity: Identity,
    pub driver: Option<DriverDescriptor>,
}

/// Everything seen during one pass over the addresses
#[derive(Debug, Clone, Default)]
pub struct Survey {
    pub candidates: Vec<Candidate>,
    /// Addresses that could not be opened or did not answer, with the reason
    pub unreachable: Vec<(Address, String)>,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found {
        address: Address,
        identity: Identity,
        driver: DriverDescriptor,
    },
    /// Instruments answered but none is supported, all of them are listed
    NoMatch(Vec<Candidate>),
    /// More than one supported instrument, only the matched ones are listed
    Ambiguous(Vec<Candidate>),
}

impl Resolution {
    /// The resolved pair, or the discovery failure to report
    pub fn into_found(self) -> Result<(Address, DriverDescriptor), Error> {
        match self {
            Resolution::Found {
                address, driver, ..
            } => Ok((address, driver)),
            Resolution::NoMatch(candidates) => Err(Error::NoMatch { candidates }),
            Resolution::Ambiguous(candidates) => Err(Error::Ambiguous { candidates }),
        }
    }
}

/// Addresses containing `hint`, in listing order
pub fn filter_addresses(addresses: Vec<Address>, hint: Option<&str>) -> Vec<Address> {
    match hint {
        Some(hint) => addresses.into_iter().filter(|a| a.contains(hint)).collect(),
        None => addresses,
    }
}

fn identify(
    manager: &dyn ResourceManager,
    address: &Address,
    timeout: Duration,
) -> Result<Identity, TransportError> {
    let mut session = ScopedSession::open(manager, address, timeout)?;
    let raw = session.query(IDENTITY_QUERY)?;
    Ok(Identity::parse(&raw))
}

/// Enumerate, filter and identify every reachable instrument
///
/// Fails with [`Error::NoResources`] if no address is left after filtering
/// and with [`Error::Transport`] if the addresses cannot be listed at all.
pub fn survey(
    manager: &dyn ResourceManager,
    registry: &Registry,
    hint: Option<&str>,
    timeout: Duration,
) -> Result<Survey, Error> {
    let hint = hint.filter(|h| !h.is_empty());
    let addresses = filter_addresses(manager.list_resources()?, hint);

    if addresses.is_empty() {
        return Err(Error::NoResources {
            hint: hint.map(String::from),
        });
    }

    let mut survey = Survey::default();
    for address in addresses {
        match identify(manager, &address, timeout) {
            Ok(identity) => {
                let driver = registry.find(&identity).copied();
                debug!(
                    "{}: {} -> {}",
                    address,
                    identity,
                    driver.map(|d| d.id()).unwrap_or("unsupported")
                );
                survey.candidates.push(Candidate {
                    address,
                    identity,
                    driver,
                });
            }
            Err(e) => {
                warn!("skipping {}: {}", address, e);
                survey.unreachable.push((address, e.to_string()));
            }
        }
    }

    Ok(survey)
}

/// Reduce a survey to exactly one instrument, or report why not
pub fn resolve(survey: Survey) -> Resolution {
    let (mut matched, unmatched): (Vec<Candidate>, Vec<Candidate>) = survey
        .candidates
        .into_iter()
        .partition(|c| c.driver.is_some());

    if matched.len() > 1 {
        return Resolution::Ambiguous(matched);
    }

    match matched.pop() {
        Some(Candidate {
            address,
            identity,
            driver: Some(driver),
        }) => {
            info!("found {} at {} ({})", identity, address, driver.id());
            Resolution::Found {
                address,
                identity,
                driver,
            }
        }
        _ => Resolution::NoMatch(unmatched),
    }
}

pub fn discover(
    manager: &dyn ResourceManager,
    registry: &Registry,
    hint: Option<&str>,
    timeout: Duration,
) -> Result<Resolution, Error> {
    Ok(resolve(survey(manager, registry, hint, timeout)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(list: &[&str]) -> Vec<Address> {
        list.iter().map(|a| Address::from(*a)).collect()
    }

    #[test]
    fn hint_is_case_sensitive_substring() {
        let list = addresses(&[
            "USB0::0x1AB1::0x044C::DHO9A000000001::INSTR",
            "TCPIP0::192.168.1.5::5555::SOCKET",
        ]);
        assert_eq!(
            filter_addresses(list.clone(), Some("DHO")),
            addresses(&["USB0::0x1AB1::0x044C::DHO9A000000001::INSTR"])
        );
        assert!(filter_addresses(list.clone(), Some("dho")).is_empty());
        assert_eq!(filter_addresses(list.clone(), None), list);
    }

    #[test]
    fn hint_preserves_order() {
        let list = addresses(&["a::1", "b", "c::1"]);
        assert_eq!(
            filter_addresses(list, Some("::1")),
            addresses(&["a::1", "c::1"])
        );
    }

    fn candidate(address: &str, idn: &str, driver: Option<DriverDescriptor>) -> Candidate {
        Candidate {
            address: Address::from(address),
            identity: Identity::parse(idn),
            driver,
        }
    }

    #[test]
    fn single_match_among_unsupported() {
        let survey = Survey {
            candidates: vec![
                candidate("ASRL/dev/ttyUSB0::INSTR", "Keithley Instruments,MODEL 2000,1,A", None),
                candidate(
                    "USB0::0x1AB1::0x044C::DHO9A000000001::INSTR",
                    "RIGOL TECHNOLOGIES,DHO924,DHO9A000000001,00.01.02",
                    Some(crate::drivers::rigol::DHO),
                ),
            ],
            unreachable: Vec::new(),
        };
        match resolve(survey) {
            Resolution::Found { address, driver, .. } => {
                assert_eq!(address.as_str(), "USB0::0x1AB1::0x044C::DHO9A000000001::INSTR");
                assert_eq!(driver.id(), "rigol-dho");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn no_match_lists_unsupported() {
        let survey = Survey {
            candidates: vec![candidate(
                "ASRL/dev/ttyUSB0::INSTR",
                "Keithley Instruments,MODEL 2000,1,A",
                None,
            )],
            unreachable: Vec::new(),
        };
        match resolve(survey) {
            Resolution::NoMatch(candidates) => assert_eq!(candidates.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
