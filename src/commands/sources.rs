use crate::error::PtxError;
use crate::sources::SOURCE_KEYS;

/// List source collaborator keys the engine can bind lines from.
pub fn run_sources() -> Result<(), PtxError> {
    for key in SOURCE_KEYS {
        println!("{}", key);
    }
    Ok(())
}
