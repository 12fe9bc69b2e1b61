/* grabscope (c) by Nao Pross <np@0hm.ch>
 *
 *
 * grabscope is licensed under a
 * Creative Commons Attribution-ShareAlike 4.0 International License.
 *
 * You should have received a copy of the license along with this
 * work. If not, see <http://creativecommons.org/licenses/by-sa/4.0/>.
 */

//! Built-in instrument families

pub mod keysight;
pub mod rigol;
pub mod siglent;

use crate::driver::Registry;

impl Registry {
    /// Every supported family, most specific rule first
    pub fn builtin() -> Registry {
        Registry::new()
            .with(rigol::DHO)
            .with(rigol::DS1000Z)
            .with(siglent::SDS)
            .with(keysight::INFINIIVISION)
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::Registry;
    use crate::identity::Identity;

    fn driver_for(idn: &str) -> Option<&'static str> {
        Registry::builtin()
            .find(&Identity::parse(idn))
            .map(|d| d.id())
    }

    #[test]
    fn builtin_matches() {
        assert_eq!(
            driver_for("RIGOL TECHNOLOGIES,DHO924,DHO9A000000001,00.01.02"),
            Some("rigol-dho")
        );
        assert_eq!(
            driver_for("RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000000001,00.04.04.SP4"),
            Some("rigol-ds1000z")
        );
        assert_eq!(
            driver_for("RIGOL TECHNOLOGIES,MSO1104Z,DS1ZA000000002,00.04.04"),
            Some("rigol-ds1000z")
        );
        assert_eq!(
            driver_for("Siglent Technologies,SDS1104X-E,SDSMMEBD000001,8.2.6.1.37R9"),
            Some("siglent-sds")
        );
        assert_eq!(
            driver_for("KEYSIGHT TECHNOLOGIES,DSO-X 1204G,CN00000001,02.12"),
            Some("keysight-infiniivision")
        );
        assert_eq!(
            driver_for("AGILENT TECHNOLOGIES,MSO-X 3054A,MY00000001,02.41"),
            Some("keysight-infiniivision")
        );
    }

    #[test]
    fn unsupported_instruments() {
        assert_eq!(driver_for("RIGOL TECHNOLOGIES,DG1022Z,DG1ZA1,1.0"), None);
        assert_eq!(driver_for("Keithley Instruments,2000,1,A"), None);
    }
}
