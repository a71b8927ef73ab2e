use crate::domain::{CrmError, CrmResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShellOccupation {
    pub n: u32,
    pub nq: u32,
}

/// Ordered shell occupations shared by every level of a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConfigSignature {
    shells: Vec<ShellOccupation>,
}

impl ConfigSignature {
    pub fn parse(source: &str) -> CrmResult<Self> {
        let mut shells = Vec::new();
        for token in source.split_whitespace() {
            let parsed = token.split_once('*').and_then(|(n, nq)| {
                let n = n.parse::<u32>().ok()?;
                let nq = nq.parse::<u32>().ok()?;
                Some(ShellOccupation { n, nq })
            });
            match parsed {
                Some(shell) if shell.n > 0 => shells.push(shell),
                _ => {
                    return Err(CrmError::input_validation(
                        "INPUT.NCOMPLEX",
                        format!("invalid shell occupation '{token}' in signature '{source}'"),
                    ));
                }
            }
        }
        Ok(Self { shells })
    }

    pub fn shells(&self) -> &[ShellOccupation] {
        &self.shells
    }

    pub fn outer_n(&self) -> Option<u32> {
        self.shells.last().map(|shell| shell.n)
    }

    /// Same occupations with the outermost shell moved to `n`.
    pub fn with_outer_n(&self, n: u32) -> Self {
        let mut shells = self.shells.clone();
        if let Some(last) = shells.last_mut() {
            last.n = n;
        }
        Self { shells }
    }
}

impl Display for ConfigSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, shell) in self.shells.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}*{}", shell.n, shell.nq)?;
        }
        Ok(())
    }
}

impl From<ConfigSignature> for String {
    fn from(value: ConfigSignature) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for ConfigSignature {
    type Error = CrmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Name tag `"<core> + <n>"` of a level obtained by adding one electron in
/// shell `n` onto level `core` of the ionized stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecombinedTag {
    pub core: usize,
    pub n: u32,
}

pub fn parse_recombined_tag(name: &str) -> Option<RecombinedTag> {
    let (head, tail) = name.split_once('+')?;
    if !head.ends_with(' ') {
        return None;
    }
    let core = head.trim().parse::<usize>().ok()?;
    let digits: String = tail
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    let n = digits.parse::<u32>().ok()?;
    (n > 0).then_some(RecombinedTag { core, n })
}

#[cfg(test)]
mod tests {
    use super::{ConfigSignature, RecombinedTag, parse_recombined_tag};

    #[test]
    fn signature_round_trips_through_text() {
        let signature = ConfigSignature::parse("1*2 2*7 3*1").expect("signature should parse");
        assert_eq!(signature.shells().len(), 3);
        assert_eq!(signature.outer_n(), Some(3));
        assert_eq!(signature.to_string(), "1*2 2*7 3*1");
        assert_eq!(signature.with_outer_n(11).to_string(), "1*2 2*7 11*1");
        assert_eq!(ConfigSignature::parse("").expect("empty").shells().len(), 0);
    }

    #[test]
    fn signature_rejects_malformed_tokens() {
        let error = ConfigSignature::parse("1*2 2x1").expect_err("must fail");
        assert_eq!(error.placeholder(), "INPUT.NCOMPLEX");
        assert!(ConfigSignature::parse("0*1").is_err());
    }

    #[test]
    fn recombined_tag_needs_space_before_plus() {
        assert_eq!(
            parse_recombined_tag("3 + 10"),
            Some(RecombinedTag { core: 3, n: 10 })
        );
        assert_eq!(
            parse_recombined_tag("12 +7 extra"),
            Some(RecombinedTag { core: 12, n: 7 })
        );
        assert_eq!(parse_recombined_tag("3+10"), None);
        assert_eq!(parse_recombined_tag("2p+ 3"), None);
        assert_eq!(parse_recombined_tag("1s2 2s1"), None);
    }
}
