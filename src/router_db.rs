//! Router database: network, attributes, restrictions and hierarchies
//!
//! Building is single-writer through `&mut self`. Contraction only reads the
//! network, so [`RouterDb::add_contracted`] takes `&self`; one run at a time
//! is enforced by a lock and finished hierarchies are published as
//! `Arc<ContractedDb>` behind a read-write lock. Queries clone the `Arc` and
//! run without holding any lock.
//!
//! On-disk layout written by [`RouterDb::save`]:
//!
//! ```text
//! <dir>/manifest.json        config, vehicle types and hierarchy names
//! <dir>/network.bin          RoutingNetwork stream
//! <dir>/edge_profiles.bin    AttributesIndex stream
//! <dir>/edge_meta.bin        AttributesIndex stream
//! <dir>/restrictions-N.bin   one per vehicle type, N = manifest position
//! <dir>/contracted-N.bin     one per hierarchy, N = manifest position
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeCollection, AttributesIndex};
use crate::config::RouterDbConfig;
use crate::contracted::{
    ChQuery, ContractedDb, ContractionMode, DirectedGraphBuilder, HierarchyBuilder, RestrictionLookup, Route,
};
use crate::error::{Error, Result};
use crate::formats::{ContractedDbFile, RestrictionsFile};
use crate::network::{Coordinate, EdgeData, RoutingNetwork};
use crate::profiles::{vehicle_type, Profile};
use crate::restrictions::RestrictionsDb;

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    config: RouterDbConfig,
    vehicle_types: Vec<String>,
    contracted: Vec<String>,
}

/// Restrictions that apply to one profile, merged over vehicle types
pub struct ProfileRestrictions<'a> {
    dbs: Vec<&'a RestrictionsDb>,
    first: Option<bool>,
}

impl ProfileRestrictions<'_> {
    /// Number of restriction dbs merged
    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }
}

impl RestrictionLookup for ProfileRestrictions<'_> {
    /// With `first = Some(true)` only restrictions starting at `vertex`;
    /// with `Some(false)` only those ending there, reversed.
    fn restrictions(&self, vertex: u32) -> Vec<Vec<u32>> {
        let mut result = Vec::new();
        for db in &self.dbs {
            for restriction in db.restrictions_for(vertex) {
                match self.first {
                    None => result.push(restriction.to_vec()),
                    Some(true) if restriction.first() == Some(&vertex) => result.push(restriction.to_vec()),
                    Some(false) if restriction.last() == Some(&vertex) => {
                        result.push(restriction.iter().rev().copied().collect())
                    }
                    Some(_) => {}
                }
            }
        }
        result
    }

    fn max_restriction_len(&self) -> usize {
        self.dbs.iter().map(|db| db.max_restriction_len()).max().unwrap_or(0)
    }
}

pub struct RouterDb {
    network: RoutingNetwork,
    edge_profiles: AttributesIndex,
    edge_meta: AttributesIndex,
    /// Keyed by vehicle type; `""` applies to every vehicle
    restrictions: FxHashMap<String, RestrictionsDb>,
    config: RouterDbConfig,
    contraction_lock: Mutex<()>,
    contracted: RwLock<FxHashMap<String, Arc<ContractedDb>>>,
}

impl RouterDb {
    pub fn new(config: RouterDbConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            network: RoutingNetwork::new(config.max_edge_distance),
            edge_profiles: AttributesIndex::new(config.edge_profiles_mode)?,
            edge_meta: AttributesIndex::new(config.edge_meta_mode)?,
            restrictions: FxHashMap::default(),
            config,
            contraction_lock: Mutex::new(()),
            contracted: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn config(&self) -> &RouterDbConfig {
        &self.config
    }

    pub fn network(&self) -> &RoutingNetwork {
        &self.network
    }

    pub fn edge_profiles(&self) -> &AttributesIndex {
        &self.edge_profiles
    }

    pub fn edge_meta(&self) -> &AttributesIndex {
        &self.edge_meta
    }

    /// Network changes make every published hierarchy stale
    fn invalidate(&mut self) {
        let dropped = std::mem::take(self.contracted.get_mut());
        if !dropped.is_empty() {
            tracing::debug!(hierarchies = dropped.len(), "dropped published hierarchies");
        }
    }

    pub fn add_vertex(&mut self, vertex: u32, latitude: f32, longitude: f32) {
        self.invalidate();
        self.network.add_vertex(vertex, Coordinate::new(latitude, longitude));
    }

    /// Intern both attribute sets and add the edge
    ///
    /// A rejected distance leaves the db untouched.
    pub fn add_edge(
        &mut self,
        from: u32,
        to: u32,
        distance: f32,
        profile: &AttributeCollection,
        meta: &AttributeCollection,
    ) -> Result<u32> {
        self.network.check_distance(distance)?;
        let profile_id = self.edge_profiles.add(Some(profile))?;
        let profile = u16::try_from(profile_id).map_err(|_| {
            Error::invalid_argument(format!("edge profile id {profile_id} does not fit in 16 bits"))
        })?;
        let meta_id = self.edge_meta.add(Some(meta))?;
        let id = self.network.add_edge(
            from,
            to,
            EdgeData {
                distance,
                profile,
                meta_id,
            },
        )?;
        self.invalidate();
        Ok(id)
    }

    /// Restrictions db for a vehicle type, created on first use
    pub fn restrictions_mut(&mut self, vehicle_type: &str) -> &mut RestrictionsDb {
        self.invalidate();
        let hash_count = self.config.restriction_hash_count;
        self.restrictions
            .entry(vehicle_type.to_string())
            .or_insert_with(|| RestrictionsDb::new(hash_count))
    }

    pub fn try_get_restrictions(&self, vehicle_type: &str) -> Option<&RestrictionsDb> {
        self.restrictions.get(vehicle_type)
    }

    fn restriction_dbs(&self, profile: &dyn Profile) -> Vec<&RestrictionsDb> {
        let mut dbs = Vec::new();
        for vt in std::iter::once(vehicle_type::ALL).chain(profile.vehicle_types().iter().copied()) {
            if let Some(db) = self.restrictions.get(vt) {
                if !dbs.iter().any(|d: &&RestrictionsDb| std::ptr::eq(*d, db)) {
                    dbs.push(db);
                }
            }
        }
        dbs
    }

    pub fn has_complex_restrictions(&self, profile: &dyn Profile) -> bool {
        self.restriction_dbs(profile)
            .iter()
            .any(|db| db.has_complex_restrictions())
    }

    pub fn restriction_lookup(&self, profile: &dyn Profile, first: Option<bool>) -> ProfileRestrictions<'_> {
        ProfileRestrictions {
            dbs: self.restriction_dbs(profile),
            first,
        }
    }

    /// Contract the network for `profile` and publish the result under the
    /// profile name. Runs one at a time; nothing is published on error.
    pub fn add_contracted(&self, profile: &dyn Profile, force_edge_based: bool) -> Result<()> {
        let _guard = self.contraction_lock.lock();
        let start = Instant::now();

        let lookup = self.restriction_lookup(profile, None);
        let mode = if force_edge_based || self.has_complex_restrictions(profile) {
            ContractionMode::EdgeBased
        } else {
            ContractionMode::VertexBased
        };
        tracing::debug!(
            profile = profile.name(),
            ?mode,
            restriction_dbs = lookup.db_count(),
            "selected contraction mode"
        );

        let graph = DirectedGraphBuilder::new(&self.network, &self.edge_profiles, profile).run()?;
        let db = HierarchyBuilder::new(graph, mode, &lookup, &self.config.contraction).run()?;

        self.contracted
            .write()
            .insert(profile.name().to_string(), Arc::new(db));
        tracing::info!(
            profile = profile.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "published hierarchy"
        );
        Ok(())
    }

    pub fn contracted(&self, name: &str) -> Option<Arc<ContractedDb>> {
        self.contracted.read().get(name).cloned()
    }

    pub fn has_contracted(&self, name: &str) -> bool {
        self.contracted.read().contains_key(name)
    }

    fn require_contracted(&self, profile: &dyn Profile) -> Result<Arc<ContractedDb>> {
        self.contracted(profile.name()).ok_or_else(|| {
            Error::invalid_operation(format!("no hierarchy for profile '{}'", profile.name()))
        })
    }

    pub fn route(&self, profile: &dyn Profile, source: u32, target: u32) -> Result<Option<Route>> {
        let db = self.require_contracted(profile)?;
        let lookup = self.restriction_lookup(profile, None);
        ChQuery::new(&db, &lookup).route(source, target)
    }

    /// Row-major weight matrix; `None` where no route exists
    pub fn many_to_many(&self, profile: &dyn Profile, sources: &[u32], targets: &[u32]) -> Result<Vec<Option<f32>>> {
        let db = self.require_contracted(profile)?;
        let lookup = self.restriction_lookup(profile, None);
        ChQuery::new(&db, &lookup).many_to_many(sources, targets)
    }

    /// Swap two vertex ids everywhere; published hierarchies are dropped
    pub fn switch_vertices(&mut self, vertex1: u32, vertex2: u32) {
        self.invalidate();
        self.network.switch(vertex1, vertex2);
        for db in self.restrictions.values_mut() {
            db.switch(vertex1, vertex2);
        }
    }

    /// Write every store into `dir`, creating it if needed
    pub fn save<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        // edge ids shift when removed edges are compacted away
        let mapping = self.network.compress();
        if mapping.iter().enumerate().any(|(i, m)| *m != Some(i as u32)) {
            self.invalidate();
        }

        let mut vehicle_types: Vec<String> = self.restrictions.keys().cloned().collect();
        vehicle_types.sort();
        let contracted = self.contracted.read().clone();
        let mut names: Vec<String> = contracted.keys().cloned().collect();
        names.sort();

        let mut writer = BufWriter::new(File::create(dir.join("network.bin"))?);
        let network_bytes = self.network.serialize(&mut writer)?;
        writer.flush()?;
        let mut writer = BufWriter::new(File::create(dir.join("edge_profiles.bin"))?);
        self.edge_profiles.serialize(&mut writer)?;
        writer.flush()?;
        let mut writer = BufWriter::new(File::create(dir.join("edge_meta.bin"))?);
        self.edge_meta.serialize(&mut writer)?;
        writer.flush()?;

        for (i, vt) in vehicle_types.iter().enumerate() {
            if let Some(db) = self.restrictions.get(vt) {
                RestrictionsFile::write(dir.join(format!("restrictions-{i}.bin")), db)?;
            }
        }
        for (i, name) in names.iter().enumerate() {
            if let Some(db) = contracted.get(name) {
                ContractedDbFile::write(dir.join(format!("contracted-{i}.bin")), db)?;
            }
        }

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            config: self.config.clone(),
            vehicle_types,
            contracted: names,
        };
        let mut writer = BufWriter::new(File::create(dir.join("manifest.json"))?);
        serde_json::to_writer_pretty(&mut writer, &manifest)?;
        writer.flush()?;

        tracing::info!(
            dir = %dir.display(),
            network_bytes,
            restriction_dbs = manifest.vehicle_types.len(),
            hierarchies = manifest.contracted.len(),
            "router db saved"
        );
        Ok(())
    }

    /// Read a database written by [`save`](Self::save). Attribute indexes
    /// come back read-only.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest: Manifest = serde_json::from_reader(BufReader::new(File::open(dir.join("manifest.json"))?))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::UnsupportedVersion {
                format: "router db manifest",
                found: manifest.version,
                supported: MANIFEST_VERSION,
            });
        }
        manifest.config.validate()?;

        let network = RoutingNetwork::deserialize(&mut BufReader::new(File::open(dir.join("network.bin"))?))?;
        let edge_profiles =
            AttributesIndex::deserialize(&mut BufReader::new(File::open(dir.join("edge_profiles.bin"))?))?;
        let edge_meta = AttributesIndex::deserialize(&mut BufReader::new(File::open(dir.join("edge_meta.bin"))?))?;

        let mut restrictions = FxHashMap::default();
        for (i, vt) in manifest.vehicle_types.iter().enumerate() {
            let db = RestrictionsFile::read(dir.join(format!("restrictions-{i}.bin")))?;
            restrictions.insert(vt.clone(), db);
        }
        let mut contracted = FxHashMap::default();
        for (i, name) in manifest.contracted.iter().enumerate() {
            let db = ContractedDbFile::read(dir.join(format!("contracted-{i}.bin")))?;
            if db.vertex_count() != network.vertex_count() {
                return Err(Error::corrupt(format!(
                    "hierarchy '{name}' has {} vertices, network has {}",
                    db.vertex_count(),
                    network.vertex_count()
                )));
            }
            contracted.insert(name.clone(), Arc::new(db));
        }

        tracing::info!(
            dir = %dir.display(),
            vertices = network.vertex_count(),
            edges = network.edge_count(),
            hierarchies = contracted.len(),
            "router db loaded"
        );
        Ok(Self {
            network,
            edge_profiles,
            edge_meta,
            restrictions,
            config: manifest.config,
            contraction_lock: Mutex::new(()),
            contracted: RwLock::new(contracted),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::{BicycleProfile, CarProfile};

    fn residential() -> AttributeCollection {
        AttributeCollection::from_pairs(&[("highway", "residential")])
    }

    /// 0 - 1 - 2 - 3 - 4, 100 m per edge
    fn line_db(restriction_hash_count: usize) -> RouterDb {
        let config = RouterDbConfig {
            restriction_hash_count,
            ..RouterDbConfig::default()
        };
        let mut db = RouterDb::new(config).unwrap();
        for v in 0..5 {
            db.add_vertex(v, 50.0, 4.0 + v as f32 * 0.001);
        }
        for v in 0..4 {
            db.add_edge(v, v + 1, 100.0, &residential(), &AttributeCollection::new())
                .unwrap();
        }
        db
    }

    #[test]
    fn test_add_edge_interns_attributes() {
        let db = line_db(64);
        assert_eq!(db.network().edge_count(), 4);
        let edge = db.network().get_edge(2).unwrap();
        assert_eq!(edge.data.profile, db.network().get_edge(0).unwrap().data.profile);
        let profile = db.edge_profiles().get(edge.data.profile as u32).unwrap().unwrap();
        assert_eq!(profile.get("highway"), Some("residential"));
    }

    #[test]
    fn test_distance_limit() {
        let mut db = line_db(64);
        assert!(matches!(
            db.add_edge(0, 4, 6000.0, &residential(), &AttributeCollection::new()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejected_edge_leaves_db_untouched() {
        let mut db = line_db(64);
        db.add_contracted(&CarProfile, false).unwrap();
        let profiles = db.edge_profiles().count().unwrap();
        let mut meta = Vec::new();
        db.edge_meta().serialize(&mut meta).unwrap();

        let primary = AttributeCollection::from_pairs(&[("highway", "primary")]);
        let name = AttributeCollection::from_pairs(&[("name", "Ring")]);
        for distance in [1e9, -1.0, f32::NAN] {
            assert!(matches!(
                db.add_edge(2, 3, distance, &primary, &name),
                Err(Error::InvalidArgument(_))
            ));
        }
        assert!(db.has_contracted("car"));
        assert_eq!(db.edge_profiles().count().unwrap(), profiles);
        let mut meta_after = Vec::new();
        db.edge_meta().serialize(&mut meta_after).unwrap();
        assert_eq!(meta_after, meta);
        assert_eq!(db.network().edge_count(), 4);

        db.add_edge(2, 3, 50.0, &primary, &name).unwrap();
        assert!(!db.has_contracted("car"));
    }

    #[test]
    fn test_route_requires_hierarchy() {
        let db = line_db(64);
        assert!(matches!(db.route(&CarProfile, 0, 4), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_mode_selection() {
        let mut db = line_db(64);
        db.restrictions_mut(vehicle_type::ALL).add(&[2]).unwrap();
        db.add_contracted(&CarProfile, false).unwrap();
        assert_eq!(db.contracted("car").unwrap().mode(), ContractionMode::VertexBased);

        db.restrictions_mut(vehicle_type::MOTORCAR).add(&[1, 2, 3]).unwrap();
        assert!(!db.has_contracted("car"));
        assert!(db.has_complex_restrictions(&CarProfile));
        assert!(!db.has_complex_restrictions(&BicycleProfile));
        db.add_contracted(&CarProfile, false).unwrap();
        assert_eq!(db.contracted("car").unwrap().mode(), ContractionMode::EdgeBased);

        db.add_contracted(&BicycleProfile, true).unwrap();
        assert_eq!(db.contracted("bicycle").unwrap().mode(), ContractionMode::EdgeBased);
    }

    #[test]
    fn test_lookup_filters_by_position() {
        let mut db = line_db(64);
        db.restrictions_mut(vehicle_type::ALL).add(&[1, 2, 3]).unwrap();
        db.restrictions_mut(vehicle_type::MOTORCAR).add(&[3, 2]).unwrap();

        let all = db.restriction_lookup(&CarProfile, None);
        assert_eq!(all.db_count(), 2);
        assert_eq!(all.restrictions(3).len(), 2);
        assert_eq!(all.max_restriction_len(), 3);

        let first = db.restriction_lookup(&CarProfile, Some(true));
        assert_eq!(first.restrictions(3), vec![vec![3, 2]]);
        let last = db.restriction_lookup(&CarProfile, Some(false));
        assert_eq!(last.restrictions(3), vec![vec![3, 2, 1]]);

        // bicycles only see the shared db
        assert_eq!(db.restriction_lookup(&BicycleProfile, None).restrictions(3).len(), 1);
    }

    #[test]
    fn test_route_and_matrix() {
        let db = line_db(64);
        db.add_contracted(&CarProfile, false).unwrap();
        let route = db.route(&CarProfile, 0, 4).unwrap().unwrap();
        assert_eq!(route.vertices, vec![0, 1, 2, 3, 4]);
        let matrix = db.many_to_many(&CarProfile, &[0, 4], &[0, 4]).unwrap();
        assert_eq!(matrix[0], Some(0.0));
        assert_eq!(matrix[1], Some(route.weight));
        assert_eq!(matrix[2], matrix[1]);
    }

    #[test]
    fn test_switch_vertices_drops_hierarchies() {
        let mut db = line_db(64);
        db.restrictions_mut(vehicle_type::ALL).add(&[0, 1, 2]).unwrap();
        db.add_contracted(&CarProfile, false).unwrap();
        db.switch_vertices(0, 4);
        assert!(!db.has_contracted("car"));
        let restrictions = db.try_get_restrictions(vehicle_type::ALL).unwrap();
        assert_eq!(restrictions.restrictions_for(4).next(), Some(&[4, 1, 2][..]));
        assert!(restrictions.restrictions_for(0).next().is_none());
    }

    #[test]
    fn test_profile_id_must_fit_u16() {
        let mut db = RouterDb::new(RouterDbConfig::default()).unwrap();
        // dense ids start at 2, so 65534 distinct profiles fill the u16 range
        for i in 0..=65534u32 {
            let value = i.to_string();
            let attrs = AttributeCollection::from_pairs(&[("highway", "residential"), ("ref", value.as_str())]);
            let result = db.add_edge(0, 1, 1.0, &attrs, &AttributeCollection::new());
            if i < 65534 {
                assert_eq!(db.network().get_edge(result.unwrap()).unwrap().data.profile as u32, i + 2);
            } else {
                assert!(matches!(result, Err(Error::InvalidArgument(_))));
            }
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut db = line_db(64);
        db.restrictions_mut(vehicle_type::ALL).add(&[1, 2, 3]).unwrap();
        db.add_contracted(&CarProfile, false).unwrap();
        let expected = db.route(&CarProfile, 4, 0).unwrap().unwrap();

        let dir = tempfile::tempdir().unwrap();
        db.save(dir.path()).unwrap();
        let loaded = RouterDb::load(dir.path()).unwrap();

        assert_eq!(loaded.network().edge_count(), 4);
        assert!(loaded.edge_profiles().is_readonly());
        assert!(loaded.has_contracted("car"));
        assert_eq!(loaded.route(&CarProfile, 4, 0).unwrap().unwrap(), expected);
        assert!(loaded.route(&CarProfile, 0, 4).unwrap().is_none());
    }
}
