pub(crate) mod assets;
pub(crate) mod driver;
pub(crate) mod mesh;
pub(crate) mod readiness;
pub(crate) mod rotation;
