use std::iter::FusedIterator;
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::mesonfield::MesonFieldSource;
use crate::types::{MesonFieldMatrix, TimeSlice};

/// A loaded meson field block together with the time slices it covers.
pub type LoadedField = (TimeSlice, Rc<MesonFieldMatrix>);

enum LoaderState {
    /// The block currently held for each leg.
    Active(Vec<Option<LoadedField>>),
    Exhausted,
}

/// Streams the meson field blocks of all legs of a diagram in lock-step.
///
/// Step `k` yields, for every leg `i`, the block of `files[i]` at
/// `times[i][k]`. A block is only read from the source if neither the
/// previous step of the same leg nor an earlier leg of the current step
/// already holds it.
pub struct MesonLoader<'a, S: ?Sized> {
    source: &'a S,
    files: Vec<PathBuf>,
    times: Vec<Vec<TimeSlice>>,
    step: usize,
    state: LoaderState,
}

impl<'a, S> MesonLoader<'a, S>
where
    S: MesonFieldSource + ?Sized,
{
    /// Creates a loader over `files`, one per leg, with the per-leg time
    /// sequences `times`.
    pub fn new(source: &'a S, files: Vec<PathBuf>, times: Vec<Vec<TimeSlice>>) -> Result<Self> {
        if files.is_empty() {
            return Err(Error::Value("meson loader needs at least one leg".into()));
        }
        if files.len() != times.len() {
            return Err(Error::Value(format!(
                "got {} meson files but {} time sequences",
                files.len(),
                times.len()
            )));
        }
        let steps = times[0].len();
        if let Some(leg) = times.iter().position(|t| t.len() != steps) {
            return Err(Error::Value(format!(
                "time sequence of leg {leg} has length {}, expected {steps}",
                times[leg].len()
            )));
        }

        let npoint = files.len();
        Ok(Self {
            source,
            files,
            times,
            step: 0,
            state: LoaderState::Active(vec![None; npoint]),
        })
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, LoaderState::Exhausted)
    }

    fn advance(&mut self) -> Option<Result<Vec<LoadedField>>> {
        let steps = self.times[0].len();
        let LoaderState::Active(current) = &mut self.state else {
            return None;
        };
        if self.step >= steps {
            self.state = LoaderState::Exhausted;
            return None;
        }
        let k = self.step;
        self.step += 1;

        for i in 0..self.files.len() {
            let time = &self.times[i][k];
            if matches!(&current[i], Some((held, _)) if held == time) {
                trace!(leg = i, step = k; "Reusing held block");
                continue;
            }

            let shared = (0..i)
                .filter(|&j| self.files[j] == self.files[i] && self.times[j][k] == *time)
                .find_map(|j| current[j].as_ref().map(|(_, field)| (j, Rc::clone(field))));

            let field = if let Some((j, field)) = shared {
                debug!(leg = i, shared_with = j, step = k; "Sharing block with earlier leg");
                field
            } else {
                match self.source.load(&self.files[i], time) {
                    Ok(matrix) => Rc::new(matrix),
                    Err(e) => {
                        self.state = LoaderState::Exhausted;
                        return Some(Err(e));
                    }
                }
            };
            current[i] = Some((time.clone(), field));
        }

        Some(Ok(current.iter().flatten().cloned().collect()))
    }
}

impl<S> Iterator for MesonLoader<'_, S>
where
    S: MesonFieldSource + ?Sized,
{
    type Item = Result<Vec<LoadedField>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}

impl<S> FusedIterator for MesonLoader<'_, S> where S: MesonFieldSource + ?Sized {}
