//! In-memory KV driver used for tests and embedders.

use crate::kv::{
    DriverError, KvContainer, KvDriver, KvResult, OpenMode, ReadSet, WriteSet, ERR_NONEXIST,
    ERR_NO_PERM,
};
use crate::types::{
    AttributeKey, DistributionKey, ObjectClass, ObjectId, OidDkey, MAX_OBJECT_CLASS_NAME_LEN,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, RwLock};

/// Placement classes the reference driver recognizes. `SX` doubles as the
/// metadata class used by the page-storage core.
const DEFAULT_KNOWN_CLASSES: &[&str] = &["S1", "S2", "S4", "SX", "RP_2G1", "RP_3G1", "EC_2P1G1"];

#[derive(Default, Debug)]
struct ContainerState {
    default_class: RwLock<Option<ObjectClass>>,
    objects: RwLock<FxHashMap<OidDkey, FxHashMap<AttributeKey, Vec<u8>>>>,
}

#[derive(Default)]
struct PoolState {
    containers: RwLock<FxHashMap<String, Arc<ContainerState>>>,
}

/// Process-local driver: pools and containers live in shared memory, so a
/// sink and a source opened on the same driver observe the same dataset.
pub struct MemKvDriver {
    pools: RwLock<FxHashMap<String, Arc<PoolState>>>,
    known_classes: FxHashSet<String>,
}

impl Default for MemKvDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemKvDriver {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(FxHashMap::default()),
            known_classes: DEFAULT_KNOWN_CLASSES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Driver with a caller-supplied object-class registry.
    pub fn with_known_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pools: RwLock::new(FxHashMap::default()),
            known_classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    fn pool(&self, label: &str, create: bool) -> KvResult<Arc<PoolState>> {
        if let Some(pool) = self.pools.read().unwrap().get(label) {
            return Ok(Arc::clone(pool));
        }
        if !create {
            return Err(DriverError::new(
                ERR_NONEXIST,
                format!("open pool '{label}'"),
            ));
        }
        let mut pools = self.pools.write().unwrap();
        Ok(Arc::clone(pools.entry(label.to_string()).or_default()))
    }
}

impl KvDriver for MemKvDriver {
    type Container = MemKvContainer;

    fn open_container(
        &self,
        pool_label: &str,
        container_label: &str,
        mode: OpenMode,
    ) -> KvResult<Self::Container> {
        let create = mode == OpenMode::CreateIfAbsent;
        let pool = self.pool(pool_label, create)?;

        let state = {
            if let Some(state) = pool.containers.read().unwrap().get(container_label) {
                Some(Arc::clone(state))
            } else {
                None
            }
        };
        let state = match state {
            Some(state) => state,
            None if create => {
                let mut containers = pool.containers.write().unwrap();
                Arc::clone(containers.entry(container_label.to_string()).or_default())
            }
            None => {
                return Err(DriverError::new(
                    ERR_NONEXIST,
                    format!("open container '{container_label}'"),
                ));
            }
        };

        Ok(MemKvContainer {
            state,
            writable: create,
        })
    }

    fn object_class_known(&self, name: &str) -> bool {
        name.len() <= MAX_OBJECT_CLASS_NAME_LEN && self.known_classes.contains(name)
    }
}

/// Handle to an open in-memory container.
#[derive(Debug)]
pub struct MemKvContainer {
    state: Arc<ContainerState>,
    writable: bool,
}

impl MemKvContainer {
    fn check_writable(&self, op: &str) -> KvResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(DriverError::new(ERR_NO_PERM, format!("{op} on read-only container")))
        }
    }
}

impl KvContainer for MemKvContainer {
    fn set_default_object_class(&self, class: &ObjectClass) -> KvResult<()> {
        *self.state.default_class.write().unwrap() = Some(class.clone());
        Ok(())
    }

    fn default_object_class(&self) -> ObjectClass {
        self.state
            .default_class
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ObjectClass::new("SX"))
    }

    fn write_single(
        &self,
        oid: ObjectId,
        dkey: DistributionKey,
        akey: AttributeKey,
        _class: Option<&ObjectClass>,
        value: &[u8],
    ) -> KvResult<()> {
        self.check_writable("write_single")?;
        let mut objects = self.state.objects.write().unwrap();
        objects
            .entry(OidDkey::new(oid, dkey))
            .or_default()
            .insert(akey, value.to_vec());
        Ok(())
    }

    fn read_single(
        &self,
        oid: ObjectId,
        dkey: DistributionKey,
        akey: AttributeKey,
        _class: Option<&ObjectClass>,
        buf: &mut [u8],
    ) -> KvResult<usize> {
        let objects = self.state.objects.read().unwrap();
        let value = objects
            .get(&OidDkey::new(oid, dkey))
            .and_then(|attrs| attrs.get(&akey))
            .ok_or_else(|| DriverError::new(ERR_NONEXIST, format!("read {oid}/{dkey:x}/{akey:x}")))?;
        let n = value.len().min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }

    fn write_v(&self, requests: &WriteSet<'_>) -> KvResult<()> {
        self.check_writable("write_v")?;
        let mut objects = self.state.objects.write().unwrap();
        for (od, attrs) in requests {
            let entry = objects.entry(*od).or_default();
            for (&akey, value) in attrs {
                entry.insert(akey, value.to_vec());
            }
        }
        Ok(())
    }

    fn read_v(&self, requests: &mut ReadSet<'_>) -> KvResult<()> {
        let objects = self.state.objects.read().unwrap();
        for (od, attrs) in requests.iter_mut() {
            let entry = objects.get(od).ok_or_else(|| {
                DriverError::new(ERR_NONEXIST, format!("read_v {}/{:x}", od.oid, od.dkey))
            })?;
            for (&akey, dst) in attrs.iter_mut() {
                let value = entry.get(&akey).ok_or_else(|| {
                    DriverError::new(ERR_NONEXIST, format!("read_v {}/{:x}/{akey:x}", od.oid, od.dkey))
                })?;
                let n = value.len().min(dst.len());
                dst[..n].copy_from_slice(&value[..n]);
            }
        }
        Ok(())
    }
}
