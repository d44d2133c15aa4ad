//! Drives the evaluation of all configured diagrams.
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};

use crate::config::template::{fill_template, Replacements};
use crate::config::{DiagramConfig, RunConfig};
use crate::contraction::{accumulate_blocks, default_open_indices, time_average};
use crate::correlator::{Correlator, CorrelatorMap};
use crate::diagram::{enumerate_contractions, Contraction, ContractionType};
use crate::error::{Error, Result};
use crate::io::write_pickle;
use crate::mesonfield::loader::MesonLoader;
use crate::mesonfield::{Hdf5MesonFieldSource, MassShift, MesonFieldSource};
use crate::mpi::Collective;
use crate::partitioning::partition;
use crate::types::Permutation;

/// Operator inserted on the middle leg of the strong isospin breaking diagram.
pub const SCALAR_INSERTION: &str = "G1_G1";

/// One output file of a permutation together with the correlators it holds.
struct Output {
    path: PathBuf,
    correlators: CorrelatorMap,
}

/// Evaluates the diagrams of a run on one worker.
///
/// All workers execute the same sequence of contractions on their share of
/// the time blocks. Partial results are summed on the root, which averages
/// and writes them.
pub struct Contractor<'a, C: ?Sized> {
    run: &'a RunConfig,
    comm: &'a C,
}

impl<'a, C> Contractor<'a, C>
where
    C: Collective + ?Sized,
{
    pub fn new(run: &'a RunConfig, comm: &'a C) -> Self {
        Self { run, comm }
    }

    /// Evaluates every configured diagram in label order.
    pub fn run(&self) -> Result<()> {
        debug!(rank = self.comm.rank(), size = self.comm.size(), nt = self.run.nt(); "Starting contractions");
        for (label, diagram) in &self.run.diagrams {
            self.run_diagram(label, diagram)?;
        }
        Ok(())
    }

    /// Evaluates all permutations of one diagram, reading meson fields from
    /// HDF5 files.
    pub fn run_diagram(&self, label: &str, diagram: &DiagramConfig) -> Result<()> {
        diagram.validate(label)?;
        let replacements = diagram.replacements(&self.run.replacements());
        let source = meson_source(diagram, &replacements)?;
        self.run_diagram_with_source(label, diagram, &source)
    }

    /// Evaluates all permutations of one diagram with meson fields from
    /// `source`.
    pub fn run_diagram_with_source<S>(
        &self,
        label: &str,
        diagram: &DiagramConfig,
        source: &S,
    ) -> Result<()>
    where
        S: MesonFieldSource + ?Sized,
    {
        diagram.validate(label)?;
        let replacements = diagram.replacements(&self.run.replacements());

        let perms = diagram.permutations()?;
        debug!(diagram = label, perms:? = perms.iter().map(ToString::to_string).collect::<Vec<_>>(); "Computing permutations");

        for perm in &perms {
            let outputs = self.outputs(label, diagram, &replacements, perm)?;
            if self.skip(&outputs)? {
                continue;
            }
            info!(diagram = label, permkey = perm.key(); "Contracting diagram");

            let start = Instant::now();
            let outputs = self.evaluate_permutation(diagram, &replacements, perm, source, outputs)?;
            debug!(permkey = perm.key(), seconds = start.elapsed().as_secs_f64(); "Total elapsed time");

            if self.comm.is_root() {
                for output in &outputs {
                    write_pickle(&output.path, &output.correlators)?;
                    info!(file:% = output.path.display(), correlators = output.correlators.len(); "Wrote correlators");
                }
            }
        }
        Ok(())
    }

    /// The output files of `perm`: one per QED subdiagram, one otherwise.
    fn outputs(
        &self,
        label: &str,
        diagram: &DiagramConfig,
        replacements: &Replacements,
        perm: &Permutation,
    ) -> Result<Vec<Output>> {
        let permkey = perm.key();
        let (names, depth): (Vec<&str>, usize) = match diagram.contraction_type {
            ContractionType::QedConn4pt => (
                diagram.subdiagrams.iter().map(|d| d.label()).collect(),
                3,
            ),
            _ => (vec![label], 2),
        };
        names
            .into_iter()
            .map(|name| {
                let r = replacements.with(&[("permkey", permkey.as_str()), ("diagram", name)]);
                Ok(Output {
                    path: PathBuf::from(fill_template(&diagram.outfile, &r)?),
                    correlators: CorrelatorMap::new(depth)?,
                })
            })
            .collect()
    }

    /// Whether all outputs already exist and may not be overwritten. The root
    /// decides for all workers.
    fn skip(&self, outputs: &[Output]) -> Result<bool> {
        let skip = self.comm.is_root()
            && !self.run.overwrite_correlators
            && outputs.iter().all(|output| output.path.exists());
        let skip = self.comm.broadcast_serializing(skip)?;
        if skip {
            for output in outputs {
                info!(file:% = output.path.display(); "Skipping write. File exists");
            }
        }
        Ok(skip)
    }

    fn evaluate_permutation<S>(
        &self,
        diagram: &DiagramConfig,
        replacements: &Replacements,
        perm: &Permutation,
        source: &S,
        mut outputs: Vec<Output>,
    ) -> Result<Vec<Output>>
    where
        S: MesonFieldSource + ?Sized,
    {
        let gammas = diagram.gamma_labels()?;
        let high_label = diagram.high_label.as_deref();
        let low_label = diagram.low_label.as_deref();

        for contraction in enumerate_contractions(perm, &diagram.mode_labels())? {
            info!(contraction:%; "Processing mode");
            let key = contraction.key(high_label, low_label);

            match diagram.contraction_type {
                ContractionType::Conn2pt | ContractionType::SibConn3pt => {
                    // Every leg of the three-point function stays open.
                    let open_indices: Vec<usize> = match diagram.contraction_type {
                        ContractionType::Conn2pt => default_open_indices(2),
                        _ => (0..diagram.npoint()).collect(),
                    };
                    let averaged = diagram.contraction_type.is_time_averaged();
                    for gamma in &gammas {
                        let operators = match diagram.contraction_type {
                            ContractionType::Conn2pt => vec![gamma.as_str(); 2],
                            _ => vec![gamma.as_str(), SCALAR_INSERTION, gamma.as_str()],
                        };
                        let files = meson_files(diagram, replacements, &contraction, &operators)?;
                        info!(gamma = gamma.as_str(); "Contracting");
                        let correlator =
                            self.evaluate(source, files, &open_indices, diagram.symmetric, averaged)?;
                        if let (Some(correlator), Some(output)) = (correlator, outputs.first_mut()) {
                            output.correlators.insert(&[key.as_str(), gamma.as_str()], correlator)?;
                        }
                    }
                }
                ContractionType::QedConn4pt => {
                    for em in diagram.em_labels()? {
                        for gamma in &gammas {
                            for (subdiagram, output) in diagram.subdiagrams.iter().zip(&mut outputs) {
                                let operators = subdiagram.leg_operators(gamma, &em);
                                let files =
                                    meson_files(diagram, replacements, &contraction, &operators)?;
                                info!(gamma = gamma.as_str(), em = em.as_str(), subdiagram = subdiagram.label(); "Contracting");
                                let correlator = self.evaluate(
                                    source,
                                    files,
                                    &subdiagram.open_indices(),
                                    false,
                                    true,
                                )?;
                                if let Some(correlator) = correlator {
                                    output
                                        .correlators
                                        .insert(&[key.as_str(), gamma.as_str(), em.as_str()], correlator)?;
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(outputs)
    }

    /// Contracts this worker's share of the time blocks and reduces the
    /// partial results on the root. Returns the correlator on the root only.
    fn evaluate<S>(
        &self,
        source: &S,
        files: Vec<PathBuf>,
        open_indices: &[usize],
        symmetric: bool,
        averaged: bool,
    ) -> Result<Option<Correlator>>
    where
        S: MesonFieldSource + ?Sized,
    {
        let nt = self.run.nt();
        let times = partition(nt, files.len(), self.comm.size(), self.comm.rank(), symmetric)?;
        let loader = MesonLoader::new(source, files, times)?;
        let mut local = accumulate_blocks(loader, open_indices, nt, symmetric)?;
        debug!(rank = self.comm.rank(); "Contraction completed");

        let data = local
            .as_slice_memory_order_mut()
            .ok_or_else(|| Error::Value("correlator buffer is not contiguous".into()))?;
        self.comm.barrier();
        self.comm.reduce_sum(data);

        if !self.comm.is_root() {
            return Ok(None);
        }
        let result = if averaged {
            time_average(&local, (0, 1))?
        } else {
            local
        };
        Ok(Some(Correlator::new(result)))
    }
}

/// Builds the HDF5 source of a diagram, including the mass shift if one is
/// configured.
fn meson_source(diagram: &DiagramConfig, replacements: &Replacements) -> Result<Hdf5MesonFieldSource> {
    let source = Hdf5MesonFieldSource::new().with_truncation(diagram.low_max, diagram.low_max);
    let (Some((old_mass, new_mass)), Some(evalfile)) = (diagram.mass_shift()?, &diagram.evalfile)
    else {
        return Ok(source);
    };
    let evalfile = fill_template(evalfile, replacements)?;
    let shift = MassShift::from_file(Path::new(&evalfile), old_mass, new_mass, diagram.milc_mass)?;
    Ok(source.with_mass_shift(shift))
}

/// The meson field file of every leg. Leg `k` connects the bra and ket labels
/// of `contraction` at leg `k` through `operators[k]`.
fn meson_files(
    diagram: &DiagramConfig,
    replacements: &Replacements,
    contraction: &Contraction,
    operators: &[&str],
) -> Result<Vec<PathBuf>> {
    operators
        .iter()
        .enumerate()
        .map(|(leg, &gamma)| {
            let r = replacements.with(&[
                ("w", contraction.bra(leg)),
                ("v", contraction.ket(leg)),
                ("gamma", gamma),
            ]);
            fill_template(&diagram.mesonfile, &r).map(PathBuf::from)
        })
        .collect()
}
