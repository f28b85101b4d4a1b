pub(crate) mod mime;
pub(crate) mod recorder;
pub(crate) mod stream;
