//! # Flotilla Cloud
//!
//! Production implementations of the two external collaborators: the
//! DigitalOcean droplet control plane ([`DigitalOcean`]) and the
//! link-local metadata identity source ([`MetadataIdentity`]).

pub mod digitalocean;
pub mod metadata;

pub use digitalocean::DigitalOcean;
pub use metadata::MetadataIdentity;
