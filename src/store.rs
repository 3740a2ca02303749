//! LMDB snapshot persistence for chart state.
//!
//! The engine itself is pure and in-memory; a service host writes a full
//! snapshot after each successful mutation and reloads it at boot. Every
//! value is a fixed-width big-endian encoding, one named database per
//! authoritative map.

use std::collections::HashMap;
use std::path::Path;

use byteorder::BigEndian;
use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions};
use primitive_types::U256;

use crate::atom::RoleId;
use crate::blocks::BlockWindow;
use crate::chart::{Chart, ChartKind};
use crate::error::{ChartError, Result};
use crate::hashing::word_of;
use crate::registry::{RoleRegistry, RoleSlot};
use crate::sig::Address;

fn err(error: impl std::fmt::Display) -> ChartError {
    ChartError::Storage(error.to_string())
}

/// bit position key → role_id ‖ structure_mask ‖ junior_mask (96 bytes)
const ROLE_RECORD_LEN: usize = 96;

pub struct Store {
    env: Env,
    /// flag bit position → role record
    roles: Database<Bytes, Bytes>,
    /// position → flag word, the juniors-before-seniors index
    index: Database<U64<BigEndian>, Bytes>,
    /// address → direct role flags
    users: Database<Bytes, Bytes>,
    /// role id → direct assignment count
    counts: Database<Bytes, U64<BigEndian>>,
    /// rule hash → governed role flags (admin sentinel included)
    rules: Database<Bytes, Bytes>,
    /// scalar words and the block window
    meta: Database<Str, Bytes>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path
        // concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1 << 30)
                .max_dbs(6)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let roles = env.create_database(&mut tx, Some("roles")).map_err(err)?;
        let index = env.create_database(&mut tx, Some("index")).map_err(err)?;
        let users = env.create_database(&mut tx, Some("users")).map_err(err)?;
        let counts = env.create_database(&mut tx, Some("counts")).map_err(err)?;
        let rules = env.create_database(&mut tx, Some("rules")).map_err(err)?;
        let meta = env.create_database(&mut tx, Some("meta")).map_err(err)?;
        tx.commit().map_err(err)?;
        Ok(Store { env, roles, index, users, counts, rules, meta })
    }

    /// Write a full snapshot in one transaction.
    pub fn save(&self, chart: &Chart) -> Result<()> {
        let mut tx = self.env.write_txn().map_err(err)?;
        self.roles.clear(&mut tx).map_err(err)?;
        self.index.clear(&mut tx).map_err(err)?;
        self.users.clear(&mut tx).map_err(err)?;
        self.counts.clear(&mut tx).map_err(err)?;
        self.rules.clear(&mut tx).map_err(err)?;
        self.meta.clear(&mut tx).map_err(err)?;

        for (position, slot) in chart.registry.slots() {
            let mut record = Vec::with_capacity(ROLE_RECORD_LEN);
            record.extend_from_slice(slot.role_id.as_bytes());
            record.extend_from_slice(&word_of(slot.structure_mask));
            record.extend_from_slice(&word_of(slot.junior_mask));
            self.roles.put(&mut tx, &[*position], &record).map_err(err)?;
        }
        for (position, flag) in chart.registry.index().iter().enumerate() {
            self.index.put(&mut tx, &(position as u64), &word_of(*flag)).map_err(err)?;
        }
        for (user, flags) in &chart.user_roles {
            self.users.put(&mut tx, &user.0, &word_of(*flags)).map_err(err)?;
        }
        for (role_id, count) in &chart.assignment_counts {
            self.counts.put(&mut tx, role_id.as_bytes(), count).map_err(err)?;
        }
        for (hash, flags) in &chart.rule_flags {
            self.rules.put(&mut tx, hash, &word_of(*flags)).map_err(err)?;
        }

        let kind: &[u8] = match chart.kind {
            ChartKind::Static => b"static",
            ChartKind::Dynamic => b"dynamic",
        };
        self.meta.put(&mut tx, "kind", kind).map_err(err)?;
        self.meta.put(&mut tx, "active", &word_of(chart.registry.active_flags())).map_err(err)?;
        self.meta.put(&mut tx, "free", &word_of(chart.registry.free_flags())).map_err(err)?;
        self.meta.put(&mut tx, "domain", &chart.domain_separator).map_err(err)?;
        self.meta.put(&mut tx, "height", &chart.blocks.height().to_be_bytes()).map_err(err)?;
        let mut recent = Vec::new();
        for hash in chart.blocks.recent_hashes() {
            recent.extend_from_slice(hash);
        }
        self.meta.put(&mut tx, "recent", &recent).map_err(err)?;

        tx.commit().map_err(err)
    }

    /// Load the last snapshot, or `None` when nothing was ever saved.
    pub fn load(&self) -> Result<Option<Chart>> {
        let tx = self.env.read_txn().map_err(err)?;
        let kind = match self.meta.get(&tx, "kind").map_err(err)? {
            Some(raw) if raw == b"static" => ChartKind::Static,
            Some(raw) if raw == b"dynamic" => ChartKind::Dynamic,
            Some(_) => return Err(err("unknown chart kind")),
            None => return Ok(None),
        };

        let active = word_meta(&self.meta, &tx, "active")?;
        let free = word_meta(&self.meta, &tx, "free")?;
        let domain_separator = bytes32_meta(&self.meta, &tx, "domain")?;
        let height_bytes = self.meta.get(&tx, "height").map_err(err)?.ok_or_else(|| err("missing height"))?;
        let height = u64::from_be_bytes(
            height_bytes.try_into().map_err(|_| err("bad height encoding"))?,
        );
        let recent_bytes = self.meta.get(&tx, "recent").map_err(err)?.unwrap_or_default();
        if recent_bytes.len() % 32 != 0 {
            return Err(err("bad block window encoding"));
        }
        let recent: Vec<[u8; 32]> = recent_bytes
            .chunks_exact(32)
            .map(|chunk| chunk.try_into().expect("chunk is 32 bytes"))
            .collect();

        let mut slots: HashMap<u8, RoleSlot> = HashMap::new();
        for item in self.roles.iter(&tx).map_err(err)? {
            let (key, value) = item.map_err(err)?;
            if key.len() != 1 || value.len() != ROLE_RECORD_LEN {
                return Err(err("bad role record"));
            }
            let role_id = RoleId::from_bytes(
                value[..32].try_into().expect("slice is 32 bytes"),
            )?;
            let structure_mask = U256::from_big_endian(&value[32..64]);
            let junior_mask = U256::from_big_endian(&value[64..96]);
            slots.insert(key[0], RoleSlot { role_id, structure_mask, junior_mask });
        }

        // U64 big-endian keys iterate in numeric order
        let mut index = Vec::new();
        for item in self.index.iter(&tx).map_err(err)? {
            let (_, value) = item.map_err(err)?;
            index.push(word_from(value)?);
        }

        let mut user_roles = HashMap::new();
        for item in self.users.iter(&tx).map_err(err)? {
            let (key, value) = item.map_err(err)?;
            let address: [u8; 20] = key.try_into().map_err(|_| err("bad address key"))?;
            user_roles.insert(Address(address), word_from(value)?);
        }

        let mut assignment_counts = HashMap::new();
        for item in self.counts.iter(&tx).map_err(err)? {
            let (key, count) = item.map_err(err)?;
            let id: [u8; 32] = key.try_into().map_err(|_| err("bad role id key"))?;
            assignment_counts.insert(RoleId::from_bytes(id)?, count);
        }

        let mut rule_flags = HashMap::new();
        for item in self.rules.iter(&tx).map_err(err)? {
            let (key, value) = item.map_err(err)?;
            let hash: [u8; 32] = key.try_into().map_err(|_| err("bad rule hash key"))?;
            rule_flags.insert(hash, word_from(value)?);
        }
        drop(tx);

        // retired flags are neither active nor free and need no record
        let registry = RoleRegistry::from_parts(slots, index, active, free);
        Ok(Some(Chart {
            kind,
            registry,
            user_roles,
            assignment_counts,
            rule_flags,
            domain_separator,
            blocks: BlockWindow::restore(height, recent),
        }))
    }
}

fn word_from(bytes: &[u8]) -> Result<U256> {
    if bytes.len() != 32 {
        return Err(err("bad word encoding"));
    }
    Ok(U256::from_big_endian(bytes))
}

fn word_meta(
    meta: &Database<Str, Bytes>,
    tx: &heed::RoTxn<'_>,
    key: &str,
) -> Result<U256> {
    let bytes = meta.get(tx, key).map_err(err)?.ok_or_else(|| err(format!("missing {key}")))?;
    word_from(bytes)
}

fn bytes32_meta(
    meta: &Database<Str, Bytes>,
    tx: &heed::RoTxn<'_>,
    key: &str,
) -> Result<[u8; 32]> {
    let bytes = meta.get(tx, key).map_err(err)?.ok_or_else(|| err(format!("missing {key}")))?;
    bytes.try_into().map_err(|_| err(format!("bad {key} encoding")))
}
