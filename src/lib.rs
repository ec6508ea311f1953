//! Butterfly-ch - contraction hierarchy core for road routing
//!
//! Interned edge attributes, turn-restriction storage and a contraction
//! hierarchy that honours restrictions in both vertex-based and edge-based
//! form.
//!
//! ```no_run
//! use butterfly_ch::profiles::CarProfile;
//! use butterfly_ch::{AttributeCollection, RouterDb, RouterDbConfig};
//!
//! # fn main() -> butterfly_ch::Result<()> {
//! let mut db = RouterDb::new(RouterDbConfig::default())?;
//! let road = AttributeCollection::from_pairs(&[("highway", "residential")]);
//! db.add_edge(0, 1, 120.0, &road, &AttributeCollection::new())?;
//! db.add_edge(1, 2, 80.0, &road, &AttributeCollection::new())?;
//! db.restrictions_mut("").add(&[0, 1, 2])?;
//!
//! db.add_contracted(&CarProfile, false)?;
//! assert!(db.route(&CarProfile, 0, 2)?.is_none());
//! # Ok(())
//! # }
//! ```

pub mod attributes;
pub mod config;
pub mod contracted;
pub mod error;
pub mod formats;
pub mod graph;
pub mod network;
pub mod profiles;
pub mod restrictions;
pub mod router_db;

pub use attributes::{AttributeCollection, AttributesIndex, AttributesIndexMode};
pub use config::{ContractionConfig, RouterDbConfig};
pub use contracted::{ContractedDb, ContractionMode, Route};
pub use error::{Error, Result};
pub use network::RoutingNetwork;
pub use restrictions::RestrictionsDb;
pub use router_db::RouterDb;
