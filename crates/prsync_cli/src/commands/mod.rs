pub(crate) mod limits;
pub(crate) mod migrate;
pub(crate) mod sync;
