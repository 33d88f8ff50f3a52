use std::fmt;

use rand::Rng;
use serde::Serialize;

/// Prefix shared by every resource this tool creates.
pub const BASE_NAME: &str = "tunnelbox";

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Unique name of one deployment.
///
/// Doubles as the droplet/firewall name and as the filename stem of every
/// artifact written to the config directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeploymentName(String);

impl DeploymentName {
    /// `tunnelbox-<suffix>-<region>` with a random lowercase suffix.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, region: &str) -> Self {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("{BASE_NAME}-{suffix}-{region}"))
    }

    /// Wrap an existing name without generating one.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeploymentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn generated_name_has_base_suffix_and_region() {
        let mut rng = StdRng::seed_from_u64(7);
        let name = DeploymentName::generate(&mut rng, "nyc3");

        let parts: Vec<&str> = name.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], BASE_NAME);
        assert_eq!(parts[1].len(), SUFFIX_LEN);
        assert!(parts[1].bytes().all(|b| SUFFIX_ALPHABET.contains(&b)));
        assert_eq!(parts[2], "nyc3");
    }

    #[test]
    fn same_seed_gives_same_name() {
        let a = DeploymentName::generate(&mut StdRng::seed_from_u64(42), "ams3");
        let b = DeploymentName::generate(&mut StdRng::seed_from_u64(42), "ams3");
        assert_eq!(a, b);
    }

    #[test]
    fn repeated_generation_gives_distinct_names() {
        let mut rng = rand::rng();
        let a = DeploymentName::generate(&mut rng, "nyc3");
        let b = DeploymentName::generate(&mut rng, "nyc3");
        assert_ne!(a, b);
    }
}
