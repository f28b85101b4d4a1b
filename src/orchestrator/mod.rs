pub(crate) mod pipeline;
pub(crate) mod process;
pub(crate) mod render_host;
pub(crate) mod transcode;
