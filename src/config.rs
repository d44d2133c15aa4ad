//! Typed run configuration, loaded from the `contract` section of a YAML
//! parameter file.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use log::LevelFilter;
use serde::Deserialize;

use crate::diagram::{enumerate_permutations, ContractionType, ModeLabels, QedSubdiagram};
use crate::error::{Error, Result};
use crate::mesonfield::parse_mass;
use crate::types::{LegMode, Permutation};

pub mod template;

use template::{fill_template, Replacements};

/// Polarizations of the QED current.
pub const QED_POLARIZATIONS: [&str; 3] = ["X", "Y", "Z"];

fn default_true() -> bool {
    true
}

fn default_logging_level() -> String {
    "INFO".into()
}

fn default_subdiagrams() -> Vec<QedSubdiagram> {
    vec![QedSubdiagram::Photex, QedSubdiagram::Selfen]
}

/// The compute backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hardware {
    #[default]
    Cpu,
    Gpu,
}

/// Settings of one configured diagram.
#[derive(Debug, Clone, Deserialize)]
pub struct DiagramConfig {
    pub contraction_type: ContractionType,
    #[serde(default)]
    pub gammas: Vec<String>,
    /// Mass label of the meson fields, e.g. `"01"` for `0.01`.
    pub mass: String,
    /// Template of the meson field file names. Besides the run and diagram
    /// settings it receives `w`, `v` and `gamma`.
    pub mesonfile: String,
    /// Template of the output file names. Besides the run and diagram
    /// settings it receives `permkey` and `diagram`.
    pub outfile: String,
    pub evalfile: Option<String>,
    #[serde(default)]
    pub symmetric: bool,
    /// Mass label to shift the low modes to.
    pub newmass: Option<String>,
    #[serde(default = "default_true")]
    pub milc_mass: bool,
    pub high_count: Option<usize>,
    pub high_label: Option<String>,
    /// Truncation of both mode ranges.
    pub low_max: Option<usize>,
    pub low_label: Option<String>,
    /// Template turning a polarization into a QED gamma label.
    #[serde(alias = "mesonKey")]
    pub meson_key: Option<String>,
    pub emseedstring: Option<String>,
    pub n_em: Option<usize>,
    #[serde(default = "default_subdiagrams")]
    pub subdiagrams: Vec<QedSubdiagram>,
    /// Leg-mode permutations to compute instead of all admissible ones.
    pub perms: Option<Vec<String>>,
}

impl DiagramConfig {
    #[must_use]
    pub fn npoint(&self) -> usize {
        self.contraction_type.npoint()
    }

    /// Whether stochastic high modes are configured.
    #[must_use]
    pub fn has_high(&self) -> bool {
        self.high_label.is_some() && self.high_count.is_some_and(|count| count > 0)
    }

    /// Whether low modes are configured.
    #[must_use]
    pub fn has_low(&self) -> bool {
        self.low_label.is_some()
    }

    #[must_use]
    pub fn mode_labels(&self) -> ModeLabels<'_> {
        ModeLabels {
            low_label: self.low_label.as_deref(),
            high_label: self.high_label.as_deref(),
            high_count: self.high_count.unwrap_or_default(),
        }
    }

    /// The leg-mode permutations to compute: the configured `perms`, or every
    /// permutation the available modes admit.
    pub fn permutations(&self) -> Result<Vec<Permutation>> {
        let Some(perms) = &self.perms else {
            return Ok(enumerate_permutations(
                self.npoint(),
                self.has_high(),
                self.has_low(),
            ));
        };

        perms
            .iter()
            .map(|perm| {
                let parsed = Permutation::from_str(perm)?;
                if parsed.npoint() != self.npoint() {
                    return Err(Error::Config(format!(
                        "permutation {perm} has {} legs, {} needs {}",
                        parsed.npoint(),
                        self.contraction_type,
                        self.npoint()
                    )));
                }
                if parsed.low_count() > 0 && !self.has_low() {
                    return Err(Error::Config(format!(
                        "permutation {perm} needs low modes, but no low_label is set"
                    )));
                }
                if parsed.modes().contains(&LegMode::High) && !self.has_high() {
                    return Err(Error::Config(format!(
                        "permutation {perm} needs high modes, but high_label or high_count is missing"
                    )));
                }
                Ok(parsed)
            })
            .collect()
    }

    /// The gamma labels to iterate over. QED diagrams derive them from the
    /// polarizations through `meson_key`.
    pub fn gamma_labels(&self) -> Result<Vec<String>> {
        if self.contraction_type != ContractionType::QedConn4pt {
            return Ok(self.gammas.clone());
        }
        let meson_key = self
            .meson_key
            .as_deref()
            .ok_or_else(|| Error::Config("qed_conn_4pt requires meson_key".into()))?;
        QED_POLARIZATIONS
            .iter()
            .map(|polarization| {
                fill_template(meson_key, &Replacements::new().with(&[("gamma", polarization)]))
            })
            .collect()
    }

    /// The EM field labels `{emseedstring}_{i}` for `i < n_em`.
    pub fn em_labels(&self) -> Result<Vec<String>> {
        let (Some(seed), Some(n_em)) = (&self.emseedstring, self.n_em) else {
            return Err(Error::Config(
                "qed_conn_4pt requires emseedstring and n_em".into(),
            ));
        };
        Ok((0..n_em).map(|i| format!("{seed}_{i}")).collect())
    }

    /// The old and new quark masses, if a mass shift is requested.
    pub fn mass_shift(&self) -> Result<Option<(f64, f64)>> {
        let Some(newmass) = &self.newmass else {
            return Ok(None);
        };
        if self.evalfile.is_none() {
            return Err(Error::Config(
                "mass shift requested via newmass, but no evalfile is set".into(),
            ));
        }
        Ok(Some((parse_mass(&self.mass)?, parse_mass(newmass)?)))
    }

    /// Adds the scalar diagram settings to the run replacements.
    #[must_use]
    pub fn replacements(&self, run: &Replacements) -> Replacements {
        let mut out = run.clone();
        out.set("mass", &self.mass)
            .set("contraction_type", self.contraction_type);
        for (key, value) in [
            ("newmass", &self.newmass),
            ("low_label", &self.low_label),
            ("high_label", &self.high_label),
            ("emseedstring", &self.emseedstring),
        ] {
            if let Some(value) = value {
                out.set(key, value);
            }
        }
        for (key, value) in [
            ("high_count", self.high_count),
            ("low_max", self.low_max),
            ("n_em", self.n_em),
        ] {
            if let Some(value) = value {
                out.set(key, value);
            }
        }
        out
    }

    /// Checks the settings for consistency before any file is touched.
    pub fn validate(&self, label: &str) -> Result<()> {
        let context = |e: Error| match e {
            Error::Config(msg) => Error::Config(format!("diagram {label}: {msg}")),
            other => other,
        };

        if self.symmetric && self.contraction_type != ContractionType::Conn2pt {
            return Err(Error::NotImplemented(format!(
                "diagram {label}: symmetric evaluation of {} is not implemented",
                self.contraction_type
            )));
        }
        if !self.has_high() && !self.has_low() {
            return Err(context(Error::Config(
                "neither low_label nor high_label with high_count is set".into(),
            )));
        }
        if self.mesonfile.is_empty() || self.outfile.is_empty() {
            return Err(context(Error::Config(
                "mesonfile and outfile must not be empty".into(),
            )));
        }
        parse_mass(&self.mass).map_err(context)?;
        self.mass_shift().map_err(context)?;
        self.permutations().map_err(context)?;

        if self.contraction_type == ContractionType::QedConn4pt {
            self.em_labels().map_err(context)?;
            self.gamma_labels().map_err(context)?;
            if self.subdiagrams.is_empty() {
                return Err(context(Error::Config(
                    "qed_conn_4pt requires at least one subdiagram".into(),
                )));
            }
        } else if self.gammas.is_empty() {
            return Err(context(Error::Config("gammas must not be empty".into())));
        }

        let gammas = self.gamma_labels().map_err(context)?;
        if let Some(duplicate) = gammas.iter().duplicates().next() {
            return Err(context(Error::Config(format!(
                "gamma label {duplicate} occurs more than once"
            ))));
        }
        Ok(())
    }
}

/// Settings shared by all diagrams of one run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// The time extent of the lattice.
    #[serde(default)]
    pub time: usize,
    pub ens: Option<String>,
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub cfg: String,
    #[serde(default = "default_true")]
    pub overwrite_correlators: bool,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default = "default_logging_level")]
    pub logging_level: String,
    pub diagrams: BTreeMap<String, DiagramConfig>,
}

#[derive(Debug, Deserialize)]
struct LatticeParams {
    #[serde(rename = "TIME")]
    time: usize,
}

#[derive(Debug, Deserialize)]
struct ParamsFile {
    contract: RunConfig,
    lmi_param: Option<LatticeParams>,
}

impl RunConfig {
    /// Parses a parameter file. The time extent is taken from
    /// `contract.time`, falling back to `lmi_param.TIME`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let params: ParamsFile = serde_yaml::from_str(yaml)?;
        let mut config = params.contract;
        if config.time == 0 {
            if let Some(lattice) = params.lmi_param {
                config.time = lattice.time;
            }
        }
        Ok(config)
    }

    /// Loads and validates the parameter file at `path` for configuration
    /// `cfg` of `series`.
    pub fn load(path: &Path, series: &str, cfg: &str) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let yaml = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = Self::from_yaml_str(&yaml)?;
        config.series = series.to_string();
        config.cfg = cfg.to_string();
        config.validate()?;
        Ok(config)
    }

    /// The time extent.
    #[inline]
    #[must_use]
    pub fn nt(&self) -> usize {
        self.time
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.logging_level).map_err(|_| {
            Error::Config(format!("unknown logging level `{}`", self.logging_level))
        })
    }

    /// Replacements available to every file name template.
    #[must_use]
    pub fn replacements(&self) -> Replacements {
        let mut out = Replacements::new();
        out.set("series", &self.series)
            .set("cfg", &self.cfg)
            .set("time", self.time);
        if let Some(ens) = &self.ens {
            out.set("ens", ens);
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        if self.time == 0 {
            return Err(Error::Config(
                "time extent must be set via contract.time or lmi_param.TIME".into(),
            ));
        }
        if self.hardware == Hardware::Gpu {
            return Err(Error::NotImplemented("GPU contraction backend".into()));
        }
        self.log_level()?;
        for (label, diagram) in &self.diagrams {
            diagram.validate(label)?;
        }
        Ok(())
    }
}
