//! The hoisting algorithm.
//!
//! Works on a tree of ancestry keys (`root#a#c`). A single forward pass
//! relocates every module as far toward the root as its name allows;
//! taints permanently reserve a (name, depth) slot for one content
//! identity so later relocations can never shadow an ancestor a deeper
//! module still resolves to.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use pakt_core::config::Config;
use pakt_core::manifest::Manifest;
use pakt_resolver::reference::PackageReference;
use pakt_resolver::resolver::PackageResolver;
use pakt_util::errors::{PaktError, PaktResult};

/// Hard ceiling on ancestry depth during seeding. Dependency graphs this
/// deep are pathological; bailing beats overflowing the stack.
pub const MAX_MODULE_DEPTH: usize = 100;

const KEY_SEPARATOR: char = '#';

type NodeId = usize;

/// Where a node is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoistState {
    Seeded,
    Hoisted,
    Pruned,
}

/// One position-change record. Diagnostics only: the log never influences
/// placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoistEvent {
    Start { key: String },
    LookedAt { key: String },
    Collision { key: String },
    BrokenBy { key: String },
    SteppedUpFrom { key: String },
    FoundPosition { key: String },
    Duplicate { of: String },
    Unchanged,
    NewPosition { key: String },
    Tainted { key: String },
    RecursiveCycle { key: String },
    Orphaned,
    Ignored,
    AlreadyTopLevel,
    Deleted { key: String },
}

/// One node in the hoisting working tree.
#[derive(Clone)]
pub struct HoistManifest {
    pub key: String,
    pub original_key: String,
    pub previous_keys: Vec<String>,
    /// On-disk content identity. Two patterns can resolve to byte-identical
    /// content, so duplicate-vs-collision decisions compare this, never
    /// version strings.
    pub loc: PathBuf,
    pub name: String,
    pub manifest: Arc<Manifest>,
    pub reference: Arc<PackageReference>,
    pub state: HoistState,
    pub history: Vec<HoistEvent>,
    /// Every (transitive) dependent seeded underneath this node.
    transitive: IndexSet<NodeId>,
}

impl HoistManifest {
    fn new(
        key: String,
        loc: PathBuf,
        manifest: Arc<Manifest>,
        reference: Arc<PackageReference>,
    ) -> Self {
        let mut node = Self {
            original_key: key.clone(),
            previous_keys: Vec::new(),
            loc,
            name: manifest.name.clone(),
            manifest,
            reference,
            state: HoistState::Seeded,
            history: Vec::new(),
            transitive: IndexSet::new(),
            key,
        };
        node.add_history(HoistEvent::Start {
            key: node.key.clone(),
        });
        node
    }

    fn add_history(&mut self, event: HoistEvent) {
        self.history.push(event);
    }
}

impl std::fmt::Debug for HoistManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoistManifest")
            .field("key", &self.key)
            .field("original_key", &self.original_key)
            .field("loc", &self.loc)
            .field("state", &self.state)
            .finish()
    }
}

fn explode_key(key: &str) -> Vec<String> {
    key.split(KEY_SEPARATOR).map(str::to_string).collect()
}

fn implode_key(parts: &[String]) -> String {
    parts.join("#")
}

struct NewPosition {
    parts: Vec<String>,
    existing: Option<NodeId>,
    duplicate: bool,
}

pub struct PackageHoister<'a> {
    config: &'a Config,
    resolver: &'a PackageResolver,
    nodes: Vec<HoistManifest>,
    /// Seed-order snapshot of the tree; the hoist pass walks this while
    /// `tree` is being rewritten underneath it.
    zipped_tree: Vec<NodeId>,
    /// key -> node, iterated in insertion order.
    tree: IndexMap<String, NodeId>,
    /// Keys permanently reserved for one content identity.
    tainted_keys: HashMap<String, NodeId>,
}

impl<'a> PackageHoister<'a> {
    pub fn new(config: &'a Config, resolver: &'a PackageResolver) -> Self {
        Self {
            config,
            resolver,
            nodes: Vec::new(),
            zipped_tree: Vec::new(),
            tree: IndexMap::new(),
            tainted_keys: HashMap::new(),
        }
    }

    /// Reserve `key` for this node's identity. Fails (returns false) when
    /// the key is already reserved for different content.
    fn taint_key(&mut self, key: &str, id: NodeId) -> bool {
        if let Some(&existing) = self.tainted_keys.get(key) {
            if self.nodes[existing].loc != self.nodes[id].loc {
                return false;
            }
        }
        self.tainted_keys.insert(key.to_string(), id);
        true
    }

    /// Seed the working tree from the resolver's top-level patterns.
    pub fn seed(&mut self, patterns: &[String]) -> PaktResult<()> {
        for pattern in self.resolver.dedupe_patterns(patterns) {
            self.seed_pattern(&pattern, &[])?;
        }
        Ok(())
    }

    /// Seed one pattern at the given ancestry, depth-first pre-order.
    /// Returns every node created underneath it, self last.
    fn seed_pattern(&mut self, pattern: &str, parent_parts: &[String]) -> PaktResult<Vec<NodeId>> {
        if parent_parts.len() >= MAX_MODULE_DEPTH {
            return Err(PaktError::CycleDepth {
                key: implode_key(parent_parts),
                depth: MAX_MODULE_DEPTH,
            }
            .into());
        }

        let Some(resolution) = self.resolver.get_resolved_pattern(pattern) else {
            // an optional dependency that silently failed to install
            return Ok(Vec::new());
        };
        let manifest = resolution.manifest;
        let reference = resolution.reference;
        let loc =
            self.config
                .generate_module_path(&manifest.name, &manifest.version, &manifest.uid);

        // prevent a module from appearing inside its own subtree: if the
        // same content already sits somewhere on the ancestor chain, taint
        // that position and stop recursing
        let mut own_parts = parent_parts.to_vec();
        for i in (0..=own_parts.len()).rev() {
            let check_key = implode_key(&own_parts[..i]);
            if let Some(&check) = self.tree.get(&check_key) {
                if self.nodes[check].loc == loc {
                    self.taint_key(&check_key, check);
                    self.nodes[check].add_history(HoistEvent::RecursiveCycle { key: check_key });
                    return Ok(Vec::new());
                }
            }
        }

        own_parts.push(manifest.name.clone());
        let key = implode_key(&own_parts);

        let id = self.nodes.len();
        self.nodes
            .push(HoistManifest::new(key.clone(), loc, manifest, reference));
        self.zipped_tree.push(id);
        self.tree.insert(key.clone(), id);
        self.taint_key(&key, id);

        let mut results = Vec::new();
        for dep_pattern in self.nodes[id].reference.dependencies() {
            results.extend(self.seed_pattern(&dep_pattern, &own_parts)?);
        }

        for &sub in &results {
            self.nodes[id].transitive.insert(sub);
        }
        results.push(id);
        Ok(results)
    }

    /// Find the best position this node can move to.
    fn get_new_parts(&mut self, key: &str, id: NodeId, mut parts: Vec<String>) -> NewPosition {
        let mut step_up = false;
        let mut stack: Vec<String> = Vec::new();
        let Some(name) = parts.pop() else {
            return NewPosition {
                parts,
                existing: None,
                duplicate: false,
            };
        };

        // scan upward: a shallower node with our exact content is a
        // duplicate we can alias to; different content (or a foreign
        // taint) is the collision boundary
        for i in (0..parts.len()).rev() {
            let mut check_parts = parts[..i].to_vec();
            check_parts.push(name.clone());
            let check_key = implode_key(&check_parts);
            self.nodes[id].add_history(HoistEvent::LookedAt {
                key: check_key.clone(),
            });

            if let Some(&existing) = self.tree.get(&check_key) {
                if self.nodes[existing].loc == self.nodes[id].loc {
                    return NewPosition {
                        parts: check_parts,
                        existing: Some(existing),
                        duplicate: true,
                    };
                }
                // everything above would be shadowed
                self.nodes[id].add_history(HoistEvent::Collision { key: check_key });
                break;
            }

            if let Some(&taint) = self.tainted_keys.get(&check_key) {
                if self.nodes[taint].loc != self.nodes[id].loc {
                    self.nodes[id].add_history(HoistEvent::BrokenBy { key: check_key });
                    break;
                }
            }
        }

        // pop ancestor segments that won't collide
        while let Some(last) = parts.last().cloned() {
            let mut check_parts = parts.clone();
            check_parts.push(name.clone());
            let check_key = implode_key(&check_parts);

            if self.tree.contains_key(&check_key) {
                step_up = true;
                break;
            }

            // a reserved slot here means a previously unflattened module
            // would conflict; we'll need to move back up
            if check_key != key && self.tainted_keys.contains_key(&check_key) {
                step_up = true;
                break;
            }

            parts.pop();
            stack.push(last);
        }

        parts.push(name.clone());

        // the loop above never tests the top level itself
        let mut existing = None;
        if !self.is_valid_position(id, &parts, &mut existing) {
            step_up = true;
        }

        // step back down toward the original position, re-inserting one
        // popped ancestor at a time; the first valid position wins
        while step_up && !stack.is_empty() {
            self.nodes[id].add_history(HoistEvent::SteppedUpFrom {
                key: implode_key(&parts),
            });

            parts.pop();
            if let Some(ancestor) = stack.pop() {
                parts.push(ancestor);
            }
            parts.push(name.clone());

            if self.is_valid_position(id, &parts, &mut existing) {
                self.nodes[id].add_history(HoistEvent::FoundPosition {
                    key: implode_key(&parts),
                });
                step_up = false;
            }
        }

        NewPosition {
            parts,
            existing,
            duplicate: false,
        }
    }

    /// A position is valid when its occupant (or reservation) shares our
    /// content identity, or when it is entirely free.
    fn is_valid_position(&self, id: NodeId, parts: &[String], existing: &mut Option<NodeId>) -> bool {
        let candidate = implode_key(parts);
        *existing = self.tree.get(&candidate).copied();
        if let Some(found) = *existing {
            if self.nodes[found].loc == self.nodes[id].loc {
                return true;
            }
        }
        match self.tainted_keys.get(&candidate) {
            Some(&taint) => self.nodes[taint].loc == self.nodes[id].loc,
            None => true,
        }
    }

    /// Whether the parent position referenced by `parts` has been removed.
    fn is_orphan(&self, parts: &[String]) -> bool {
        let parent_key = implode_key(&parts[..parts.len().saturating_sub(1)]);
        !parent_key.is_empty() && !self.tree.contains_key(&parent_key)
    }

    /// Hoist all seeded modules to their highest non-conflicting
    /// positions, in one forward pass over the seed order.
    pub fn hoist(&mut self) -> PaktResult<()> {
        for i in 0..self.zipped_tree.len() {
            let id = self.zipped_tree[i];
            let key = self.nodes[id].key.clone();
            let raw_parts = explode_key(&key);

            // nothing to hoist, already top level
            if raw_parts.len() == 1 {
                self.nodes[id].add_history(HoistEvent::AlreadyTopLevel);
                self.nodes[id].state = HoistState::Hoisted;
                continue;
            }

            // remove ourselves from the tree so we can't collide with
            // our own entry
            self.tree.shift_remove(&key);

            if self.is_orphan(&raw_parts) {
                self.nodes[id].add_history(HoistEvent::Orphaned);
                self.nodes[id].state = HoistState::Pruned;
                continue;
            }

            let position = self.get_new_parts(&key, id, raw_parts.clone());
            let new_key = implode_key(&position.parts);
            let old_key = key;

            if position.duplicate {
                self.nodes[id].add_history(HoistEvent::Duplicate {
                    of: new_key.clone(),
                });
                self.declare_rename(id, position.existing, &raw_parts, &position.parts, true)?;
                self.nodes[id].state = HoistState::Pruned;
                continue;
            }

            if old_key == new_key {
                self.nodes[id].add_history(HoistEvent::Unchanged);
                self.set_key(id, &old_key);
                self.nodes[id].state = HoistState::Hoisted;
                continue;
            }

            tracing::debug!("hoisting {} -> {new_key}", old_key);
            self.declare_rename(id, position.existing, &raw_parts, &position.parts, false)?;
            self.set_key(id, &new_key);
            self.update_transitive_keys(id, &old_key, &new_key);
            self.taint_key(&new_key, id);
            self.nodes[id].state = HoistState::Hoisted;
        }
        Ok(())
    }

    /// Record a relocation: merge transitive bookkeeping into the
    /// surviving node, attach to the new parent, and reserve the
    /// abandoned path.
    fn declare_rename(
        &mut self,
        id: NodeId,
        existing: Option<NodeId>,
        old_parts: &[String],
        new_parts: &[String],
        duplicate: bool,
    ) -> PaktResult<()> {
        if let Some(existing) = existing.filter(|&e| e != id) {
            if duplicate {
                // the node at the duplicate position survives; it absorbs
                // the dropped node's transitive set
                let moved: Vec<NodeId> = self.nodes[id].transitive.iter().copied().collect();
                self.nodes[existing].transitive.extend(moved);
            } else {
                let moved: Vec<NodeId> =
                    self.nodes[existing].transitive.iter().copied().collect();
                self.nodes[id].transitive.extend(moved);
            }
        }

        let new_parent_parts = &new_parts[..new_parts.len().saturating_sub(1)];
        let new_parent_key = implode_key(new_parent_parts);
        if !new_parent_key.is_empty() {
            let Some(&parent) = self.tree.get(&new_parent_key) else {
                return Err(PaktError::Invariant {
                    message: format!("couldn't find parent {new_parent_key}"),
                }
                .into());
            };
            self.nodes[parent].transitive.insert(id);
        }

        // reserve our name along the path we are abandoning
        let old_parent_parts = old_parts[..old_parts.len().saturating_sub(1)].to_vec();
        self.taint_parents(id, &old_parent_parts, new_parts.len() - 1);
        Ok(())
    }

    /// Taint this package's name at every ancestor level from `start`
    /// down along `process_parts`.
    fn taint_parents(&mut self, id: NodeId, process_parts: &[String], start: usize) {
        for i in start..process_parts.len() {
            let mut parts = process_parts[..i].to_vec();
            parts.push(self.nodes[id].name.clone());
            let key = implode_key(&parts);

            if self.taint_key(&key, id) {
                self.nodes[id].add_history(HoistEvent::Tainted { key });
            }
        }
    }

    /// Rewrite the keys of every transitive dependent so their ancestry
    /// literally reflects the move from `old_key` to `new_key`.
    fn update_transitive_keys(&mut self, id: NodeId, old_key: &str, new_key: &str) {
        let old_prefix = format!("{old_key}#");
        let new_prefix = format!("{new_key}#");

        let subs: Vec<NodeId> = self.nodes[id].transitive.iter().copied().collect();
        for sub in subs {
            let sub_key = self.nodes[sub].key.clone();
            if sub_key == new_key {
                continue;
            }
            // only dependents still present at their recorded position
            let Some(&found) = self.tree.get(&sub_key) else {
                continue;
            };
            if !sub_key.starts_with(&old_prefix) {
                continue;
            }

            let new_sub_key = format!("{new_prefix}{}", &sub_key[old_prefix.len()..]);
            if new_sub_key == sub_key {
                continue;
            }

            // restrict use of the new key in case it hoists further later
            self.tainted_keys.insert(new_sub_key.clone(), found);

            self.set_key(found, &new_sub_key);
            self.tree.shift_remove(&sub_key);
            self.nodes[found].add_history(HoistEvent::Deleted { key: sub_key });
        }
    }

    /// Move a node to a new key and update the tree index.
    fn set_key(&mut self, id: NodeId, new_key: &str) {
        let old_key = self.nodes[id].key.clone();

        self.nodes[id].key = new_key.to_string();
        self.tree.insert(new_key.to_string(), id);

        if old_key != new_key {
            self.nodes[id].previous_keys.push(new_key.to_string());
            self.nodes[id].add_history(HoistEvent::NewPosition {
                key: new_key.to_string(),
            });
        }
    }

    /// Drop ignored and orphaned modules, then decompress every surviving
    /// key into an on-disk path.
    pub fn flatten(&mut self) -> PaktResult<Vec<(PathBuf, HoistManifest)>> {
        // remove modules whose reference was marked ignored (e.g. failed
        // platform checks on optional packages)
        let ignored: Vec<(String, NodeId)> = self
            .tree
            .iter()
            .filter(|(_, id)| self.nodes[**id].reference.is_ignored())
            .map(|(key, id)| (key.clone(), *id))
            .collect();
        for (key, id) in ignored {
            self.nodes[id].add_history(HoistEvent::Ignored);
            self.nodes[id].state = HoistState::Pruned;
            self.tree.shift_remove(&key);
        }

        let entries: Vec<(String, NodeId)> = self
            .tree
            .iter()
            .map(|(key, &id)| (key.clone(), id))
            .collect();

        let mut flat_tree = Vec::new();
        for (key, id) in entries {
            let key_parts = explode_key(&key);
            if self.is_orphan(&key_parts) {
                continue;
            }

            // each ancestry segment may come from a different registry
            // with its own container folder
            let mut parts: Vec<String> = Vec::new();
            for i in 0..key_parts.len() {
                let ancestor_key = implode_key(&key_parts[..i + 1]);
                let Some(&hoisted) = self.tree.get(&ancestor_key) else {
                    return Err(PaktError::Invariant {
                        message: format!("expected hoisted manifest at {ancestor_key}"),
                    }
                    .into());
                };
                parts.push(self.nodes[hoisted].reference.registry.folder().to_string());
                parts.push(key_parts[i].clone());
            }

            let location = match &self.config.modules_folder {
                Some(folder) => {
                    // flat mode: the top-level container folder is
                    // replaced by the one shared modules folder
                    let mut path = self.config.cwd.join(folder);
                    for part in &parts[1..] {
                        path.push(part);
                    }
                    path
                }
                None => {
                    let mut path = self.config.cwd.clone();
                    for part in &parts {
                        path.push(part);
                    }
                    path
                }
            };

            flat_tree.push((location, self.nodes[id].clone()));
        }

        Ok(flat_tree)
    }

    /// Hoist and return the flattened module list.
    pub fn init(&mut self) -> PaktResult<Vec<(PathBuf, HoistManifest)>> {
        self.hoist()?;
        self.flatten()
    }
}
