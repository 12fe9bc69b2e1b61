use grabscope::identity::IDENTITY_QUERY;
use grabscope::usbtmc::UsbtmcManager;
use grabscope::{Registry, ResourceManager, ScopedSession};
use std::time::Duration;

fn main() {
    let manager = UsbtmcManager::new();
    let registry = Registry::builtin();

    let resources = match manager.list_resources() {
        Ok(resources) => resources,
        Err(e) => {
            dbg!("failed to list usb devices", e);
            return;
        }
    };

    for address in resources {
        let mut session = match ScopedSession::open(&manager, &address, Duration::from_secs(2)) {
            Ok(s) => s,
            Err(e) => {
                dbg!("failed to open", &address, e);
                continue;
            }
        };

        let idn = match session.query(IDENTITY_QUERY) {
            Ok(s) => s,
            Err(e) => {
                dbg!("failed to get identity", &address, e);
                continue;
            }
        };

        let driver = registry
            .find(&grabscope::Identity::parse(&idn))
            .map(|d| d.id());
        dbg!(address, idn, driver);
    }
}
