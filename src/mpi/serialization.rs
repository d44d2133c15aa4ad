use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serializes data to a byte array.
pub(crate) fn serialize<S>(value: &S) -> Result<Vec<u8>>
where
    S: Serialize,
{
    Ok(bincode::serialize(value)?)
}

/// Deserializes data from a byte array.
pub(crate) fn deserialize<D>(data: &[u8]) -> Result<D>
where
    D: DeserializeOwned,
{
    Ok(bincode::deserialize(data)?)
}
