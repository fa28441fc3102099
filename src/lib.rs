#![crate_name = "zblorb"]

#[macro_use]
extern crate lazy_static;

pub mod blorb_map;
pub mod blorb_writer;
pub mod chunk_reader;
pub mod config;
pub mod deflate_frame;
pub mod error;
pub mod iff;
pub mod media;
pub mod quetzal;
pub mod resource;
pub mod story;
pub mod util;

pub use blorb_map::{BlorbMap, Usage};
pub use config::LocatorConfig;
pub use error::BlorbError;
pub use resource::{LoadMethod, Resource, ResourceLoader};
pub use story::{LocatedStory, StoryLocator, StoryStream};
