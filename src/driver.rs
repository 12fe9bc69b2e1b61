/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Device drivers and the registry they are looked up in
//!
//! A driver is a plain descriptor: an identity rule, the image format the
//! instrument emits and the function that runs its capture protocol. The
//! registry keeps drivers in registration order and the first matching rule
//! wins, so more specific rules must be registered first.

use std::fmt;

use crate::error::CaptureFailure;
use crate::identity::Identity;
use crate::transport::Session;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const BMP_SIGNATURE: &[u8] = b"BM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Bmp,
}

impl ImageFormat {
    pub fn signature(self) -> &'static [u8] {
        match self {
            ImageFormat::Png => PNG_SIGNATURE,
            ImageFormat::Bmp => BMP_SIGNATURE,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Bmp => "bmp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Bmp => "BMP",
        })
    }
}

/// Identity rule: vendor substring and model prefix, any of each
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    vendors: &'static [&'static str],
    models: &'static [&'static str],
}

impl MatchRule {
    pub const fn new(vendors: &'static [&'static str], models: &'static [&'static str]) -> Self {
        MatchRule { vendors, models }
    }

    /// Vendor comparison ignores case, model prefixes are compared upper-cased
    pub fn test(&self, identity: &Identity) -> bool {
        let vendor = identity.vendor().to_uppercase();
        let model = identity.model().to_uppercase();

        self.vendors
            .iter()
            .any(|v| vendor.contains(&v.to_uppercase()))
            && self
                .models
                .iter()
                .any(|m| model.starts_with(&m.to_uppercase()))
    }
}

/// Runs a family's capture protocol on an open session, returns the image
pub type CaptureFn = fn(&mut dyn Session) -> Result<Vec<u8>, CaptureFailure>;

#[derive(Clone, Copy)]
pub struct DriverDescriptor {
    id: &'static str,
    rule: MatchRule,
    format: ImageFormat,
    capture: CaptureFn,
}

impl DriverDescriptor {
    pub const fn new(
        id: &'static str,
        rule: MatchRule,
        format: ImageFormat,
        capture: CaptureFn,
    ) -> Self {
        DriverDescriptor {
            id,
            rule,
            format,
            capture,
        }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        self.rule.test(identity)
    }

    pub fn capture_screen(&self, session: &mut dyn Session) -> Result<Vec<u8>, CaptureFailure> {
        (self.capture)(session)
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("id", &self.id)
            .field("rule", &self.rule)
            .field("format", &self.format)
            .finish()
    }
}

/// Ordered list of known drivers, fixed once discovery starts
#[derive(Debug, Clone, Default)]
pub struct Registry {
    drivers: Vec<DriverDescriptor>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn register(&mut self, driver: DriverDescriptor) {
        self.drivers.push(driver);
    }

    pub fn with(mut self, driver: DriverDescriptor) -> Registry {
        self.register(driver);
        self
    }

    /// First registered driver whose rule matches
    pub fn find(&self, identity: &Identity) -> Option<&DriverDescriptor> {
        self.drivers.iter().find(|d| d.matches(identity))
    }

    pub fn get(&self, id: &str) -> Option<&DriverDescriptor> {
        self.drivers.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriverDescriptor> {
        self.drivers.iter()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nothing(_: &mut dyn Session) -> Result<Vec<u8>, CaptureFailure> {
        Err(CaptureFailure::EmptyPayload)
    }

    const RIGOL_ANY: DriverDescriptor = DriverDescriptor::new(
        "rigol-any",
        MatchRule::new(&["RIGOL"], &[""]),
        ImageFormat::Png,
        nothing,
    );
    const RIGOL_DHO: DriverDescriptor = DriverDescriptor::new(
        "rigol-dho",
        MatchRule::new(&["RIGOL"], &["DHO"]),
        ImageFormat::Png,
        nothing,
    );

    #[test]
    fn rule_ignores_vendor_case() {
        let rule = MatchRule::new(&["SIGLENT"], &["SDS"]);
        assert!(rule.test(&Identity::parse("Siglent Technologies,SDS1104X-E,S,1")));
        assert!(rule.test(&Identity::parse("SIGLENT,sds2104x plus,S,1")));
        assert!(!rule.test(&Identity::parse("Siglent Technologies,SDG1032X,S,1")));
        assert!(!rule.test(&Identity::parse("RIGOL TECHNOLOGIES,SDS1,S,1")));
    }

    #[test]
    fn first_registered_wins() {
        let id = Identity::parse("RIGOL TECHNOLOGIES,DHO924,X,1");

        let registry = Registry::new().with(RIGOL_ANY).with(RIGOL_DHO);
        assert_eq!(registry.find(&id).map(|d| d.id()), Some("rigol-any"));

        let registry = Registry::new().with(RIGOL_DHO).with(RIGOL_ANY);
        assert_eq!(registry.find(&id).map(|d| d.id()), Some("rigol-dho"));
    }

    #[test]
    fn no_match() {
        let registry = Registry::new().with(RIGOL_DHO);
        assert!(registry.find(&Identity::parse("ACME,X1,0,0")).is_none());
        assert!(registry.get("rigol-dho").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn format_signatures() {
        assert_eq!(ImageFormat::Png.signature().len(), 8);
        assert_eq!(ImageFormat::Bmp.extension(), "bmp");
    }
}
