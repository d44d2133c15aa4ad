//! Diagram topologies and the enumeration of high/low mode assignments.
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{LegMode, Permutation};

/// The closed set of supported contraction topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContractionType {
    /// Connected two-point function, time averaged.
    Conn2pt,
    /// Connected three-point function with a scalar insertion on the middle
    /// leg (strong isospin breaking). The raw `nt^3` tensor is kept.
    SibConn3pt,
    /// Connected four-point function with two photon insertions, evaluated
    /// per [`QedSubdiagram`].
    QedConn4pt,
}

impl ContractionType {
    /// The number of meson fields in the diagram.
    #[must_use]
    pub fn npoint(self) -> usize {
        match self {
            ContractionType::Conn2pt => 2,
            ContractionType::SibConn3pt => 3,
            ContractionType::QedConn4pt => 4,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ContractionType::Conn2pt => "conn_2pt",
            ContractionType::SibConn3pt => "sib_conn_3pt",
            ContractionType::QedConn4pt => "qed_conn_4pt",
        }
    }

    /// Whether the result is folded into a function of the time separation.
    #[must_use]
    pub fn is_time_averaged(self) -> bool {
        !matches!(self, ContractionType::SibConn3pt)
    }
}

impl FromStr for ContractionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conn_2pt" => Ok(ContractionType::Conn2pt),
            "sib_conn_3pt" => Ok(ContractionType::SibConn3pt),
            "qed_conn_4pt" => Ok(ContractionType::QedConn4pt),
            _ => Err(Error::Value(format!("unrecognized diagram label: {s}"))),
        }
    }
}

impl TryFrom<String> for ContractionType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ContractionType> for String {
    fn from(value: ContractionType) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for ContractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The two ways of attaching the photon propagator in the QED four-point
/// diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QedSubdiagram {
    /// Photon exchanged between the two quark lines.
    Photex,
    /// Photon emitted and reabsorbed on the same quark line.
    Selfen,
}

impl QedSubdiagram {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            QedSubdiagram::Photex => "photex",
            QedSubdiagram::Selfen => "selfen",
        }
    }

    /// Legs whose time index stays open in the contraction.
    #[must_use]
    pub fn open_indices(self) -> [usize; 2] {
        match self {
            QedSubdiagram::Photex => [0, 2],
            QedSubdiagram::Selfen => [0, 3],
        }
    }

    /// The operator label of each leg, given the current `gamma` and EM-field
    /// seed label `em`.
    #[must_use]
    pub fn leg_operators<'a>(self, gamma: &'a str, em: &'a str) -> [&'a str; 4] {
        match self {
            QedSubdiagram::Photex => [gamma, em, gamma, em],
            QedSubdiagram::Selfen => [gamma, em, em, gamma],
        }
    }
}

impl FromStr for QedSubdiagram {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "photex" => Ok(QedSubdiagram::Photex),
            "selfen" => Ok(QedSubdiagram::Selfen),
            _ => Err(Error::Value(format!("unrecognized diagram label: {s}"))),
        }
    }
}

impl TryFrom<String> for QedSubdiagram {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<QedSubdiagram> for String {
    fn from(value: QedSubdiagram) -> Self {
        value.label().to_string()
    }
}

/// Enumerates all distinct leg-mode permutations of `npoint` legs.
///
/// The number of low legs runs from 0 (if high modes are available, else
/// `npoint`) up to `npoint` (if low modes are available, else 0). Within one
/// low count the permutations are ordered lexicographically.
///
/// # Examples
/// ```
/// # use a2a_contract::diagram::enumerate_permutations;
/// let perms = enumerate_permutations(2, true, true);
/// let perms: Vec<String> = perms.iter().map(ToString::to_string).collect();
/// assert_eq!(perms, ["HH", "HL", "LH", "LL"]);
/// ```
#[must_use]
pub fn enumerate_permutations(npoint: usize, has_high: bool, has_low: bool) -> Vec<Permutation> {
    let low_min = if has_high { 0 } else { npoint };
    let low_max = if has_low { npoint } else { 0 };

    let mut perms = Vec::new();
    for nlow in low_min..=low_max {
        let mut group = (0..npoint)
            .combinations(nlow)
            .map(|low_legs| {
                Permutation::new(
                    (0..npoint)
                        .map(|leg| {
                            if low_legs.contains(&leg) {
                                LegMode::Low
                            } else {
                                LegMode::High
                            }
                        })
                        .collect(),
                )
            })
            .collect_vec();
        group.sort();
        perms.extend(group);
    }
    perms
}

/// The bra/ket labels of every leg of one diagram evaluation, in the order
/// `[w_0, v_0, w_1, v_1, ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contraction(Vec<String>);

impl Contraction {
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    /// The bra (`w`) label of `leg`.
    #[must_use]
    pub fn bra(&self, leg: usize) -> &str {
        &self.0[2 * leg]
    }

    /// The ket (`v`) label of `leg`.
    #[must_use]
    pub fn ket(&self, leg: usize) -> &str {
        &self.0[2 * leg + 1]
    }

    #[must_use]
    pub fn npoint(&self) -> usize {
        self.0.len() / 2
    }

    /// The key under which this contraction is stored: the concatenated labels
    /// with the high-mode label removed and the low-mode label replaced by `e`.
    #[must_use]
    pub fn key(&self, high_label: Option<&str>, low_label: Option<&str>) -> String {
        let mut key = self.0.concat();
        if let Some(high) = high_label {
            key = key.replace(high, "");
        }
        if let Some(low) = low_label {
            key = key.replace(low, "e");
        }
        key
    }
}

impl fmt::Display for Contraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Mode labels needed to turn seed indices into bra/ket labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeLabels<'a> {
    pub low_label: Option<&'a str>,
    pub high_label: Option<&'a str>,
    /// The number of available stochastic high-mode seeds.
    pub high_count: usize,
}

/// Enumerates the seed combinations for `perm`.
///
/// High legs draw distinct seeds from `0..high_count` (combinations without
/// replacement). Every leg index is doubled for its bra and ket and the list
/// is rotated left by one, so that adjacent legs share the seed at their
/// common vertex. Even positions become `w<high_label><seed>`, odd positions
/// `v<high_label><seed>`, low legs the low label.
///
/// # Examples
/// ```
/// # use a2a_contract::diagram::{enumerate_contractions, ModeLabels};
/// let labels = ModeLabels { low_label: Some("e1000"), high_label: Some("seed"), high_count: 2 };
/// let contractions = enumerate_contractions(&"LH".parse().unwrap(), &labels).unwrap();
/// assert_eq!(contractions.len(), 2);
/// assert_eq!(contractions[0].labels(), ["e1000", "vseed0", "wseed0", "e1000"]);
/// assert_eq!(contractions[1].labels(), ["e1000", "vseed1", "wseed1", "e1000"]);
/// ```
pub fn enumerate_contractions(
    perm: &Permutation,
    labels: &ModeLabels,
) -> Result<Vec<Contraction>> {
    let nhigh = perm.npoint() - perm.low_count();
    let low_label = match labels.low_label {
        Some(label) => Some(label),
        None if perm.low_count() > 0 => {
            return Err(Error::Config(format!(
                "permutation {perm} has low legs, but no low label is configured"
            )))
        }
        None => None,
    };
    let high_label = match labels.high_label {
        Some(label) => label,
        None if nhigh > 0 => {
            return Err(Error::Config(format!(
                "permutation {perm} has high legs, but no high label is configured"
            )))
        }
        None => "",
    };

    let contractions = (0..labels.high_count)
        .combinations(nhigh)
        .map(|seeds| {
            let mut seeds = seeds.into_iter();
            let legs = perm
                .modes()
                .iter()
                .map(|mode| match mode {
                    LegMode::Low => None,
                    LegMode::High => seeds.next(),
                })
                .collect_vec();

            let mut doubled = legs.iter().flat_map(|s| [*s, *s]).collect_vec();
            doubled.rotate_left(1);

            Contraction(
                doubled
                    .into_iter()
                    .enumerate()
                    .map(|(i, seed)| match seed {
                        None => low_label.unwrap_or_default().to_string(),
                        Some(seed) => {
                            let side = if i % 2 == 0 { 'w' } else { 'v' };
                            format!("{side}{high_label}{seed}")
                        }
                    })
                    .collect(),
            )
        })
        .collect();
    Ok(contractions)
}
