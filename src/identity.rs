/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

use std::fmt;

/// IEEE 488.2 identification query
pub const IDENTITY_QUERY: &str = "*IDN?";

/// Parsed response to [`IDENTITY_QUERY`]
///
/// Fields are `<vendor>,<model>,<serial>,<firmware>`; missing fields are left
/// empty and the raw string is always kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    raw: String,
    vendor: String,
    model: String,
    serial: String,
    firmware: String,
}

impl Identity {
    pub fn parse(raw: &str) -> Identity {
        let raw = raw.trim();
        let mut fields = raw.splitn(4, ',').map(str::trim);
        let mut next = || fields.next().unwrap_or("").to_string();

        Identity {
            vendor: next(),
            model: next(),
            serial: next(),
            firmware: next(),
            raw: raw.to_string(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn firmware(&self) -> &str {
        &self.firmware
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rigol_identity() {
        let id = Identity::parse("RIGOL TECHNOLOGIES,DHO924,DHO9A000000001,00.01.02\n");
        assert_eq!(id.vendor(), "RIGOL TECHNOLOGIES");
        assert_eq!(id.model(), "DHO924");
        assert_eq!(id.serial(), "DHO9A000000001");
        assert_eq!(id.firmware(), "00.01.02");
        assert_eq!(id.raw(), "RIGOL TECHNOLOGIES,DHO924,DHO9A000000001,00.01.02");
    }

    #[test]
    fn keeps_commas_in_firmware_field() {
        let id = Identity::parse("Siglent Technologies,SDS1104X-E,SDSMM000000001,8.2.6.1.37R9,x");
        assert_eq!(id.firmware(), "8.2.6.1.37R9,x");
    }

    #[test]
    fn short_identity_leaves_fields_empty() {
        let id = Identity::parse("ACME");
        assert_eq!(id.vendor(), "ACME");
        assert_eq!(id.model(), "");
        assert_eq!(id.serial(), "");
    }
}
