//! Correlator values and the nested maps they are stored in.
use ndarray::ArrayD;
use num_complex::Complex64;
use rustc_hash::FxHashMap;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// A contracted correlator: a 1-D function of the time separation for
/// averaged diagrams, or a raw `nt^k` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlator(ArrayD<Complex64>);

impl Correlator {
    #[must_use]
    pub fn new(data: ArrayD<Complex64>) -> Self {
        Self(data)
    }

    #[must_use]
    pub fn data(&self) -> &ArrayD<Complex64> {
        &self.0
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

impl From<ArrayD<Complex64>> for Correlator {
    fn from(value: ArrayD<Complex64>) -> Self {
        Self(value)
    }
}

/// Serialized as `{"shape": [...], "real": [...], "imag": [...]}` with the
/// values in row-major order.
impl Serialize for Correlator {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (real, imag): (Vec<f64>, Vec<f64>) = self.0.iter().map(|c| (c.re, c.im)).unzip();
        let mut state = serializer.serialize_struct("Correlator", 3)?;
        state.serialize_field("shape", self.0.shape())?;
        state.serialize_field("real", &real)?;
        state.serialize_field("imag", &imag)?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(Correlator),
    Branch(FxHashMap<String, Node>),
}

impl Serialize for Node {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Node::Leaf(correlator) => correlator.serialize(serializer),
            Node::Branch(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (key, child) in children {
                    map.serialize_entry(key, child)?;
                }
                map.end()
            }
        }
    }
}

/// A string-keyed map nesting correlators at a fixed depth, e.g.
/// contraction key → gamma (depth 2) or contraction key → gamma → EM label
/// (depth 3).
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatorMap {
    depth: usize,
    root: FxHashMap<String, Node>,
}

impl CorrelatorMap {
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(Error::Value("correlator map depth must be positive".into()));
        }
        Ok(Self {
            depth,
            root: FxHashMap::default(),
        })
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Stores `value` under `path`, creating intermediate levels. Fails if
    /// the path length does not match the depth or a value is already stored
    /// there.
    pub fn insert(&mut self, path: &[&str], value: Correlator) -> Result<()> {
        if path.len() != self.depth {
            return Err(Error::Value(format!(
                "key path {path:?} does not match correlator map depth {}",
                self.depth
            )));
        }
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| Error::Value("empty key path".into()))?;

        let mut level = &mut self.root;
        for key in parents {
            let node = level
                .entry((*key).to_string())
                .or_insert_with(|| Node::Branch(FxHashMap::default()));
            level = match node {
                Node::Branch(children) => children,
                Node::Leaf(_) => {
                    return Err(Error::Value(format!("key path {path:?} passes through a value")))
                }
            };
        }
        if level.contains_key(*last) {
            return Err(Error::Value(format!("key path {path:?} is already set")));
        }
        level.insert((*last).to_string(), Node::Leaf(value));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&Correlator> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get(*first)?;
        for key in rest {
            node = match node {
                Node::Branch(children) => children.get(*key)?,
                Node::Leaf(_) => return None,
            };
        }
        match node {
            Node::Leaf(correlator) => Some(correlator),
            Node::Branch(_) => None,
        }
    }

    /// The number of stored correlators.
    #[must_use]
    pub fn len(&self) -> usize {
        fn count(level: &FxHashMap<String, Node>) -> usize {
            level
                .values()
                .map(|node| match node {
                    Node::Leaf(_) => 1,
                    Node::Branch(children) => count(children),
                })
                .sum()
        }
        count(&self.root)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl Serialize for CorrelatorMap {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.root.len()))?;
        for (key, node) in &self.root {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}
