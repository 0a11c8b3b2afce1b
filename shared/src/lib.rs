pub mod errors;
pub mod logging;
pub mod manifest;
pub mod media;
pub mod pipeline;
pub mod preloader;
pub mod queue;
pub mod thumbnails;
