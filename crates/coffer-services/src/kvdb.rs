//! Key-addressed entries in a kvdb container.
//!
//! Every `set_entry` writes a new object whose public meta records the key,
//! the entry version and the caller's own public meta. The newest version
//! of a key is the live entry; older objects stay in the container as
//! history. Versions start at 1, and a write must name the version it
//! replaces (0 for a new key).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use coffer_core::paging::{matches_filter, SortKey};
use coffer_core::{
    ContainerId, ObjectInfo, PagingList, PagingQuery, Result, SortOrder, TransferError,
};

use crate::containers::ContainerApi;
use crate::transfer::TransferClient;

const ENTRY_KIND: &str = "kvdbEntry";

/// Public meta of an entry object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct EntryRecord {
    kind: String,
    key: String,
    version: u64,
    #[serde(default)]
    meta: Vec<u8>,
}

impl EntryRecord {
    fn from_info(info: &ObjectInfo) -> Result<Self> {
        serde_json::from_slice(&info.public_meta).map_err(|e| {
            TransferError::invalid(format!("object {} is not a kvdb entry: {e}", info.object_id))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvdbEntry {
    pub key: String,
    pub version: u64,
    /// Public meta as given to `set_entry`.
    pub public_meta: Vec<u8>,
    /// The object holding this version.
    pub info: ObjectInfo,
    pub data: Bytes,
}

/// Entry calls bound to one kvdb.
#[derive(Clone)]
pub struct Kvdb {
    client: TransferClient,
    kvdb: ContainerId,
}

impl Kvdb {
    pub fn id(&self) -> &ContainerId {
        &self.kvdb
    }

    /// Write `data` under `key`. `version` is the version being replaced,
    /// 0 when the key is new; any other value fails with `BackendRejected`.
    /// Returns the new version.
    pub fn set_entry(
        &self,
        key: &str,
        public_meta: &[u8],
        private_meta: &[u8],
        data: &[u8],
        version: u64,
    ) -> Result<u64> {
        if key.is_empty() {
            return Err(TransferError::invalid("kvdb key must not be empty"));
        }
        let current = self
            .latest(Some(key))?
            .pop()
            .map_or(0, |(record, _)| record.version);
        if version != current {
            return Err(TransferError::rejected(format!(
                "entry {key} is at version {current}, not {version}"
            )));
        }

        let record = EntryRecord {
            kind: ENTRY_KIND.to_string(),
            key: key.to_string(),
            version: current + 1,
            meta: public_meta.to_vec(),
        };
        let meta = serde_json::to_vec(&record)
            .map_err(|e| TransferError::invalid(format!("entry meta: {e}")))?;
        let id = self.client.upload_buffer(
            &self.kvdb,
            &meta,
            private_meta,
            data,
            self.client.settings().write_chunk_size,
        )?;
        tracing::info!(kvdb = %self.kvdb, key, version = record.version, object = %id, "kvdb entry set");
        Ok(record.version)
    }

    /// The live version of `key`.
    pub fn entry(&self, key: &str) -> Result<KvdbEntry> {
        let (record, info) = self
            .latest(Some(key))?
            .pop()
            .ok_or_else(|| TransferError::not_found(format!("kvdb entry {key}")))?;
        self.load(record, info)
    }

    /// One page of live entries. `lastId` is a key; `queryAsJson` matches
    /// the entries' own public meta. With the default sort, entries are
    /// ordered by their last write.
    pub fn list_entries(&self, query: &PagingQuery) -> Result<PagingList<KvdbEntry>> {
        query.validate()?;
        let filter = query.filter()?;
        let mut live: Vec<(EntryRecord, ObjectInfo)> = self
            .latest(None)?
            .into_iter()
            .filter(|(record, _)| filter.as_ref().map_or(true, |f| matches_filter(f, &record.meta)))
            .collect();
        if query.sort_key()? == SortKey::Size {
            live.sort_by_key(|(_, info)| info.size);
        }

        let page = query.apply(live, |(record, _)| record.key.as_str())?;
        let items = page
            .items
            .into_iter()
            .map(|(record, info)| self.load(record, info))
            .collect::<Result<Vec<_>>>()?;
        Ok(PagingList {
            items,
            total_count: page.total_count,
        })
    }

    /// Newest object per key, ordered by when that version was written.
    fn latest(&self, key: Option<&str>) -> Result<Vec<(EntryRecord, ObjectInfo)>> {
        let mut filter = serde_json::json!({ "kind": ENTRY_KIND });
        if let Some(key) = key {
            filter["key"] = key.into();
        }
        let query = PagingQuery::new(0, u64::MAX, SortOrder::Asc).with_query_json(filter.to_string());
        let all = ContainerApi::kvdbs(self.client.connection().clone()).list_objects(&self.kvdb, &query)?;

        let mut live: Vec<(EntryRecord, ObjectInfo)> = Vec::new();
        for info in all.items {
            let record = EntryRecord::from_info(&info)?;
            match live.iter().position(|(r, _)| r.key == record.key) {
                Some(pos) if live[pos].0.version > record.version => {}
                Some(pos) => {
                    live.remove(pos);
                    live.push((record, info));
                }
                None => live.push((record, info)),
            }
        }
        Ok(live)
    }

    fn load(&self, record: EntryRecord, info: ObjectInfo) -> Result<KvdbEntry> {
        let data = self.client.download(&info.object_id)?;
        Ok(KvdbEntry {
            key: record.key,
            version: record.version,
            public_meta: record.meta,
            info,
            data,
        })
    }
}

impl TransferClient {
    /// Entry calls for `kvdb`, which must be a kvdb container.
    pub fn kvdb(&self, kvdb: &ContainerId) -> Result<Kvdb> {
        ContainerApi::kvdbs(self.connection().clone()).info(kvdb)?;
        Ok(Kvdb {
            client: self.clone(),
            kvdb: kvdb.clone(),
        })
    }
}
