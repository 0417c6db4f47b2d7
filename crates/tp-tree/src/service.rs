//! Page tree administration over a [`NodeStore`].
//!
//! [`TreeAdminService`] owns the write path (create, update, move, delete)
//! and a cached read snapshot used by the front end, the sitemap and
//! navigation.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tp_store::{BoundsUpdate, NodeDraft, NodeId, NodeStore, PageContent, PageNode, PageStatus, SlugUpdate, TreeId};

use crate::delete::{DeletePlan, DeletePolicy, plan_delete};
use crate::error::TreeError;
use crate::index::{Breadcrumb, TreeIndex, TreeStructure};
use crate::lock::{TreeLocks, WriteGuard};
use crate::moves::{Direction, InsertPlan, MovePlan, MovePosition, plan_insert, plan_move, resolve_direction};
use crate::navigation::{self, ManualEntry, NavContext, NavItem};
use crate::slug;

/// Submitted page form: placement plus content.
///
/// Used for both creation and full replacement on update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageForm {
    /// Parent page, `None` for a root.
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    /// Content fields.
    #[serde(flatten)]
    pub content: PageContent,
}

/// Result of a move request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// Bounds were rewritten.
    Moved {
        /// Rows whose bounds changed.
        updated: usize,
        /// Rows whose slugs changed.
        reslugged: usize,
    },
    /// The request had no effect.
    Unchanged,
}

/// Result of a delete request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Removed node ids.
    pub removed: Vec<NodeId>,
    /// Rows whose slugs changed.
    pub reslugged: usize,
}

/// A page found by its public path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPage {
    /// The page.
    pub node: PageNode,
    /// Ancestors from the root down, without the page itself.
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Outcome of resolving a public path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// A published page lives at the path.
    Found(ResolvedPage),
    /// The path needs a trailing slash. Holds the corrected path.
    Redirect(String),
    /// Nothing is published at the path.
    NotFound,
}

/// Tree ids a plan needs exclusive write access to.
trait Footprint {
    fn trees(&self, index: &TreeIndex) -> BTreeSet<TreeId>;
}

/// Tree id a root created next to `index` would get.
fn next_tree(index: &TreeIndex) -> TreeId {
    index.roots().last().map_or(1, |r| r.tree_id + 1)
}

/// True if the batch moves rows between trees or removes a root.
///
/// Either renumbers the forest, so the slot of the next root shifts too.
fn renumbers(index: &TreeIndex, updates: &[BoundsUpdate], removed: &[NodeId]) -> bool {
    updates
        .iter()
        .any(|u| index.get(u.id).is_some_and(|n| n.tree_id != u.tree_id))
        || removed
            .iter()
            .any(|&id| index.get(id).is_some_and(|n| n.parent_id.is_none()))
}

impl Footprint for MovePlan {
    fn trees(&self, index: &TreeIndex) -> BTreeSet<TreeId> {
        let mut trees = self.touched_trees.clone();
        trees.extend(self.updates.iter().map(|u| u.tree_id));
        if renumbers(index, &self.updates, &[]) {
            trees.insert(next_tree(index));
        }
        trees
    }
}

impl Footprint for InsertPlan {
    fn trees(&self, _index: &TreeIndex) -> BTreeSet<TreeId> {
        let mut trees = self.touched_trees.clone();
        trees.extend(self.shifts.iter().map(|u| u.tree_id));
        trees
    }
}

impl Footprint for DeletePlan {
    fn trees(&self, index: &TreeIndex) -> BTreeSet<TreeId> {
        let mut trees = self.touched_trees.clone();
        trees.extend(self.updates.iter().map(|u| u.tree_id));
        if renumbers(index, &self.updates, &self.removed) {
            trees.insert(next_tree(index));
        }
        trees
    }
}

/// Page tree administration with a cached snapshot.
///
/// # Thread Safety
///
/// Designed for concurrent use behind an `Arc`:
/// - Writes are serialized per tree by [`TreeLocks`]
/// - `current` holds the latest snapshot, swapped after a reload
/// - `reload_lock` serializes reloads
/// - The snapshot is valid while `loaded` equals `generation`; every write
///   bumps `generation`
pub struct TreeAdminService {
    store: Arc<dyn NodeStore>,
    locks: TreeLocks,
    /// Mutex for serializing reload operations.
    reload_lock: Mutex<()>,
    /// Current snapshot (atomically swappable).
    current: RwLock<Arc<TreeIndex>>,
    /// Bumped after every committed write.
    generation: AtomicU64,
    /// Generation the current snapshot was read at.
    loaded: AtomicU64,
}

impl TreeAdminService {
    /// Create a service over `store`. The first read loads the snapshot.
    #[must_use]
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            store,
            locks: TreeLocks::new(),
            reload_lock: Mutex::new(()),
            current: RwLock::new(Arc::new(TreeIndex::default())),
            generation: AtomicU64::new(1),
            loaded: AtomicU64::new(0),
        }
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    fn state(&self) -> Arc<TreeIndex> {
        Arc::clone(&self.current.read().unwrap())
    }

    fn is_valid(&self) -> bool {
        self.loaded.load(Ordering::Acquire) == self.generation.load(Ordering::Acquire)
    }

    /// Current snapshot, reloading from the store if a write happened since
    /// the last load.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Storage`] if the store cannot be read or
    /// [`TreeError::Corrupt`] if the rows do not form a valid forest.
    pub async fn snapshot(&self) -> Result<Arc<TreeIndex>, TreeError> {
        // Fast path: cache valid
        if self.is_valid() {
            return Ok(self.state());
        }

        let _guard = self.reload_lock.lock().await;

        // Double-check after acquiring lock
        if self.is_valid() {
            return Ok(self.state());
        }

        let generation = self.generation.load(Ordering::Acquire);
        let index = Arc::new(TreeIndex::build(self.store.list_ordered().await?)?);
        *self.current.write().unwrap() = Arc::clone(&index);
        // A write committed during the read leaves `generation` ahead.
        self.loaded.store(generation, Ordering::Release);
        tracing::debug!(nodes = index.len(), generation, "Reloaded page tree");
        Ok(index)
    }

    /// Mark the snapshot stale. Current readers keep their `Arc`.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Tree ids of `ids` in the cached snapshot, without reloading.
    fn cached_trees(&self, ids: &[NodeId]) -> BTreeSet<TreeId> {
        let state = self.state();
        ids.iter()
            .filter_map(|&id| state.get(id).map(|n| n.tree_id))
            .collect()
    }

    /// Lock the guessed trees, read a fresh index and plan against it.
    ///
    /// If the plan reaches beyond the locked trees, the locks are dropped and
    /// the plan is recomputed under exclusive access.
    async fn plan_locked<P, F>(
        &self,
        guess: BTreeSet<TreeId>,
        planner: F,
    ) -> Result<(WriteGuard<'_>, TreeIndex, P), TreeError>
    where
        P: Footprint,
        F: Fn(&TreeIndex) -> Result<P, TreeError>,
    {
        {
            let guard = self.locks.lock_trees(guess).await;
            let index = TreeIndex::build(self.store.list_ordered().await?)?;
            let plan = planner(&index)?;
            if guard.covers(&plan.trees(&index)) {
                return Ok((guard, index, plan));
            }
        }

        tracing::debug!("Write spans unlocked trees, retrying exclusively");
        let guard = self.locks.lock_all().await;
        let index = TreeIndex::build(self.store.list_ordered().await?)?;
        let plan = planner(&index)?;
        Ok((guard, index, plan))
    }

    /// Persist slug rewrites as a second commit.
    ///
    /// The bounds are already committed, so a failure here is reported
    /// without undoing them.
    async fn write_slugs(&self, updates: &[SlugUpdate]) -> Result<usize, TreeError> {
        if updates.is_empty() {
            return Ok(0);
        }
        let result = self.store.update_slugs(updates).await;
        self.invalidate();
        match result {
            Ok(()) => Ok(updates.len()),
            Err(e) => {
                tracing::error!(error = %e, count = updates.len(), "Failed to rewrite slugs after structural commit");
                Err(TreeError::Storage(e))
            }
        }
    }

    /// Get a node straight from the store.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] for unknown ids.
    pub async fn get(&self, id: NodeId) -> Result<PageNode, TreeError> {
        Ok(self.store.get(id).await?)
    }

    /// Admin tree structure keyed by node id.
    ///
    /// # Errors
    ///
    /// Same as [`Self::snapshot`].
    pub async fn tree_structure(&self) -> Result<TreeStructure, TreeError> {
        Ok(self.snapshot().await?.structure())
    }

    /// Create a page as the last child of its parent, or as a new last tree.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] for an unknown parent.
    pub async fn create(&self, form: PageForm) -> Result<PageNode, TreeError> {
        let guess = match form.parent_id {
            Some(parent) => self.cached_trees(&[parent]),
            None => {
                BTreeSet::from([next_tree(&self.state())])
            }
        };
        let (guard, index, plan) = self
            .plan_locked(guess, |index| plan_insert(index, form.parent_id))
            .await?;

        let slug = slug::derive_new(&index, plan.parent_id, &form.content.title)?;
        let draft = NodeDraft {
            parent_id: plan.parent_id,
            tree_id: plan.tree_id,
            lft: plan.lft,
            rgt: plan.rgt,
            depth: plan.depth,
            slug,
            content: form.content,
        };
        let result = self.store.insert(&draft, &plan.shifts).await;
        self.invalidate();
        drop(guard);

        let node = result?;
        tracing::info!(id = node.id, parent = ?node.parent_id, slug = %node.slug, "Created page");
        Ok(node)
    }

    /// Replace a page's content and placement.
    ///
    /// A changed parent moves the page to the last child of the new parent,
    /// or after the last tree when the parent is cleared. The page's subtree
    /// is re-slugged afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] for unknown ids and
    /// [`TreeError::InvalidMove`] if the new parent is the page itself or
    /// one of its descendants.
    pub async fn update(&self, id: NodeId, form: PageForm) -> Result<PageNode, TreeError> {
        let mut guess_ids = vec![id];
        guess_ids.extend(form.parent_id);
        let planner = |index: &TreeIndex| -> Result<MovePlan, TreeError> {
            let node = index.require(id)?;
            if node.parent_id == form.parent_id {
                return Ok(MovePlan::default());
            }
            match form.parent_id {
                Some(parent) => plan_move(index, id, parent, MovePosition::LastChildOf),
                None => {
                    let last = index
                        .roots()
                        .last()
                        .map(|r| r.id)
                        .ok_or_else(|| TreeError::Corrupt(format!("node {id} exists in a forest without roots")))?;
                    plan_move(index, id, last, MovePosition::RightOf)
                }
            }
        };
        let (guard, index, plan) = self.plan_locked(self.cached_trees(&guess_ids), planner).await?;

        if !plan.is_empty() {
            let result = self.store.update_bounds(&plan.updates).await;
            self.invalidate();
            result?;
        }
        let result = self.store.update_content(id, &form.content).await;
        self.invalidate();
        let mut updated = result?;

        let after = index.rebuild(&[], &plan.updates, std::slice::from_ref(&updated))?;
        let slugs = slug::derive_subtree(&after, id)?;
        let reslugged = self.write_slugs(&slugs).await?;
        drop(guard);

        if let Some(own) = slugs.iter().find(|s| s.id == id) {
            updated.slug.clone_from(&own.slug);
        }
        tracing::info!(id, moved = !plan.is_empty(), reslugged, "Updated page");
        Ok(updated)
    }

    /// Move a node with its subtree relative to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] for unknown ids and
    /// [`TreeError::InvalidMove`] for cyclic moves. Nothing is written in
    /// either case.
    pub async fn move_node(
        &self,
        id: NodeId,
        target: NodeId,
        position: MovePosition,
    ) -> Result<MoveOutcome, TreeError> {
        self.apply_move(id, &[id, target], |index| plan_move(index, id, target, position))
            .await
    }

    /// Move a node one step in `direction`.
    ///
    /// A direction without a target (up on a first child, left on a root)
    /// yields [`MoveOutcome::Unchanged`].
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] for unknown ids.
    pub async fn move_direction(&self, id: NodeId, direction: Direction) -> Result<MoveOutcome, TreeError> {
        self.apply_move(id, &[id], |index| match resolve_direction(index, id, direction)? {
            Some((target, position)) => plan_move(index, id, target, position),
            None => Ok(MovePlan::default()),
        })
        .await
    }

    async fn apply_move<F>(&self, id: NodeId, guess_ids: &[NodeId], planner: F) -> Result<MoveOutcome, TreeError>
    where
        F: Fn(&TreeIndex) -> Result<MovePlan, TreeError>,
    {
        let (guard, index, plan) = self.plan_locked(self.cached_trees(guess_ids), planner).await?;
        if plan.is_empty() {
            tracing::debug!(id, "Move has no effect");
            return Ok(MoveOutcome::Unchanged);
        }

        let result = self.store.update_bounds(&plan.updates).await;
        self.invalidate();
        result?;

        let after = index.rebuild(&[], &plan.updates, &[])?;
        let slugs = slug::derive_subtree(&after, id)?;
        let reslugged = self.write_slugs(&slugs).await?;
        drop(guard);

        tracing::info!(id, updated = plan.updates.len(), reslugged, "Moved page");
        Ok(MoveOutcome::Moved {
            updated: plan.updates.len(),
            reslugged,
        })
    }

    /// Delete a node under `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] for unknown ids and
    /// [`TreeError::HasChildren`] when `policy` rejects a node with children.
    pub async fn delete(&self, id: NodeId, policy: DeletePolicy) -> Result<DeleteOutcome, TreeError> {
        let (guard, index, plan) = self
            .plan_locked(self.cached_trees(&[id]), |index| plan_delete(index, id, policy))
            .await?;

        let result = self.store.remove(&plan.removed, &plan.updates).await;
        self.invalidate();
        result?;

        let after = index.rebuild(&plan.removed, &plan.updates, &[])?;
        let mut slugs = Vec::new();
        for &root in &plan.reslug_roots {
            slugs.extend(slug::derive_subtree(&after, root)?);
        }
        let reslugged = self.write_slugs(&slugs).await?;
        drop(guard);

        tracing::info!(id, %policy, removed = plan.removed.len(), reslugged, "Deleted page");
        Ok(DeleteOutcome {
            removed: plan.removed,
            reslugged,
        })
    }

    /// Resolve a public path to a published page.
    ///
    /// A missing leading `/` is added. A path without a trailing `/` that
    /// only matches with one resolves to [`Resolution::Redirect`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::snapshot`].
    pub async fn resolve_path(&self, path: &str) -> Result<Resolution, TreeError> {
        let path: Cow<'_, str> = if path.starts_with('/') {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("/{path}"))
        };
        let index = self.snapshot().await?;

        if let Some(node) = index.find_by_url(&path, PageStatus::ACTIVE) {
            return Ok(Resolution::Found(ResolvedPage {
                breadcrumbs: index.breadcrumbs(node.id),
                node: node.clone(),
            }));
        }
        if !path.ends_with('/') {
            let slashed = format!("{path}/");
            if index.find_by_url(&slashed, PageStatus::ACTIVE).is_some() {
                return Ok(Resolution::Redirect(slashed));
            }
        }
        Ok(Resolution::NotFound)
    }

    /// Published pages open to anonymous visitors, in tree order.
    ///
    /// # Errors
    ///
    /// Same as [`Self::snapshot`].
    pub async fn sitemap(&self) -> Result<Vec<PageNode>, TreeError> {
        let index = self.snapshot().await?;
        Ok(index
            .iter()
            .filter(|n| n.status >= PageStatus::ACTIVE && !n.login_required)
            .cloned()
            .collect())
    }

    /// Navigation items: `manual` first, then the trees filtered to
    /// `min_status`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::snapshot`].
    pub async fn navigation(
        &self,
        min_status: PageStatus,
        manual: &[ManualEntry],
    ) -> Result<Vec<NavItem>, TreeError> {
        let filtered = self.snapshot().await?.filtered(min_status)?;
        Ok(navigation::build(&filtered, manual))
    }

    /// Render navigation with `template`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::snapshot`].
    pub async fn render_navigation<F>(
        &self,
        min_status: PageStatus,
        manual: &[ManualEntry],
        template: F,
    ) -> Result<String, TreeError>
    where
        F: Fn(&NavContext<'_>) -> String,
    {
        let items = self.navigation(min_status, manual).await?;
        Ok(navigation::render(&items, template))
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use pretty_assertions::assert_eq;
    use static_assertions::assert_impl_all;
    use tp_store::{MemoryStore, StoreError};

    use super::*;
    use crate::navigation::default_template;
    use crate::testing::{forest, id_of, shape};

    assert_impl_all!(TreeAdminService: Send, Sync);

    fn service(outline: &str) -> (Arc<MemoryStore>, TreeAdminService) {
        let store = Arc::new(MemoryStore::from_nodes(forest(outline)));
        let service = TreeAdminService::new(Arc::clone(&store) as Arc<dyn NodeStore>);
        (store, service)
    }

    fn form(title: &str, parent_id: Option<NodeId>) -> PageForm {
        PageForm {
            parent_id,
            content: PageContent {
                title: title.to_owned(),
                status: PageStatus::InNavigation,
                ..PageContent::default()
            },
        }
    }

    async fn fresh(store: &MemoryStore) -> TreeIndex {
        let index = TreeIndex::build(store.list_ordered().await.unwrap()).unwrap();
        index.check_invariants().unwrap();
        index
    }

    #[tokio::test]
    async fn test_snapshot_is_cached_until_invalidated() {
        let (store, service) = service("A\n  B");

        let first = service.snapshot().await.unwrap();
        let second = service.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.reads(), 1);

        service.invalidate();
        let third = service.snapshot().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_move_reslugs_whole_subtree() {
        let (store, service) = service("Company\n  About\n    Team\n      Leads\n  Jobs");
        let index = fresh(&store).await;
        let (about, jobs) = (id_of(&index, "About"), id_of(&index, "Jobs"));

        let outcome = service.move_node(about, jobs, MovePosition::FirstChildOf).await.unwrap();

        let after = fresh(&store).await;
        assert_eq!(shape(&after), "Company(Jobs(About(Team(Leads))))");
        assert_eq!(
            outcome,
            MoveOutcome::Moved {
                updated: 4,
                reslugged: 3,
            }
        );
        let slugs: Vec<&str> = after.iter().map(|n| n.slug.as_str()).collect();
        assert_eq!(
            slugs,
            vec![
                "/company/",
                "/company/jobs/",
                "/company/jobs/about/",
                "/company/jobs/about/team/",
                "/company/jobs/about/team/leads/",
            ]
        );
    }

    #[tokio::test]
    async fn test_outdent_reslugs_moved_node() {
        let (store, service) = service("A\n  B\n    D\n  C");
        let index = fresh(&store).await;

        let outcome = service
            .move_node(id_of(&index, "D"), id_of(&index, "B"), MovePosition::RightOf)
            .await
            .unwrap();

        let after = fresh(&store).await;
        assert_eq!(shape(&after), "A(B,D,C)");
        assert_eq!(after.get(id_of(&after, "D")).unwrap().slug, "/a/d/");
        assert!(matches!(outcome, MoveOutcome::Moved { reslugged: 1, .. }));
    }

    #[tokio::test]
    async fn test_invalid_move_writes_nothing() {
        let (store, service) = service("A\n  B\n    D\n  C");
        let before = store.list_ordered().await.unwrap();
        let index = fresh(&store).await;

        let err = service
            .move_node(id_of(&index, "A"), id_of(&index, "D"), MovePosition::FirstChildOf)
            .await
            .unwrap_err();

        assert!(matches!(err, TreeError::InvalidMove { .. }));
        assert_eq!(store.list_ordered().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_up_on_first_child_is_unchanged() {
        let (store, service) = service("A\n  B\n  C");
        let before = store.list_ordered().await.unwrap();
        let index = fresh(&store).await;

        let outcome = service.move_direction(id_of(&index, "B"), Direction::Up).await.unwrap();

        assert_eq!(outcome, MoveOutcome::Unchanged);
        assert_eq!(store.list_ordered().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_move_direction_outdents_to_root() {
        let (store, service) = service("A\n  B\nC");
        let index = fresh(&store).await;

        service.move_direction(id_of(&index, "B"), Direction::Left).await.unwrap();

        let after = fresh(&store).await;
        assert_eq!(shape(&after), "A B C");
        assert_eq!(after.get(id_of(&after, "B")).unwrap().slug, "/b/");
    }

    #[tokio::test]
    async fn test_move_unknown_node() {
        let (_, service) = service("A");

        let err = service.move_direction(42, Direction::Down).await.unwrap_err();

        assert!(matches!(err, TreeError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_navigation_render_reads_store_once() {
        let mut outline = String::new();
        for section in 0..10 {
            writeln!(outline, "Section {section}").unwrap();
            for page in 0..9 {
                writeln!(outline, "  Page {section}.{page}").unwrap();
            }
        }
        let mut nodes = forest(&outline);
        assert_eq!(nodes.len(), 100);
        for node in nodes.iter_mut().filter(|n| n.id % 3 == 0) {
            node.status = PageStatus::Published;
        }
        let store = Arc::new(MemoryStore::from_nodes(nodes));
        let service = TreeAdminService::new(Arc::clone(&store) as Arc<dyn NodeStore>);

        let html = service
            .render_navigation(PageStatus::NAVIGATION, &[], default_template)
            .await
            .unwrap();
        assert!(html.starts_with(r#"<li><a href="/section-0/">Section 0</a>"#));
        assert_eq!(store.reads(), 1);

        service
            .render_navigation(PageStatus::NAVIGATION, &[], default_template)
            .await
            .unwrap();
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn test_create_child_and_root() {
        let (store, service) = service("Company\n  About\nBlog");
        let index = fresh(&store).await;

        let team = service.create(form("Team", Some(id_of(&index, "About")))).await.unwrap();
        let shop = service.create(form("Shop", None)).await.unwrap();

        let after = fresh(&store).await;
        assert_eq!(shape(&after), "Company(About(Team)) Blog Shop");
        assert_eq!(team.slug, "/company/about/team/");
        assert_eq!(team.depth, 2);
        assert_eq!(shop.tree_id, 3);
        assert_eq!(shop.slug, "/shop/");
    }

    #[tokio::test]
    async fn test_create_under_unknown_parent() {
        let (_, service) = service("A");

        let err = service.create(form("X", Some(9))).await.unwrap_err();

        assert!(matches!(err, TreeError::NotFound(9)));
    }

    #[tokio::test]
    async fn test_create_invalidates_snapshot() {
        let (_, service) = service("A");
        assert_eq!(service.snapshot().await.unwrap().len(), 1);

        service.create(form("B", None)).await.unwrap();

        assert_eq!(service.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_title_reslugs_descendants() {
        let (store, service) = service("Company\n  About\n    Team");
        let index = fresh(&store).await;
        let about = id_of(&index, "About");

        let updated = service
            .update(about, form("Who We Are", Some(id_of(&index, "Company"))))
            .await
            .unwrap();

        let after = fresh(&store).await;
        assert_eq!(updated.slug, "/company/who-we-are/");
        assert_eq!(after.get(id_of(&after, "Team")).unwrap().slug, "/company/who-we-are/team/");
    }

    #[tokio::test]
    async fn test_update_parent_moves_to_last_child() {
        let (store, service) = service("A\n  B\nC\n  D");
        let index = fresh(&store).await;

        let updated = service
            .update(id_of(&index, "B"), form("B", Some(id_of(&index, "C"))))
            .await
            .unwrap();

        let after = fresh(&store).await;
        assert_eq!(shape(&after), "A C(D,B)");
        assert_eq!(updated.slug, "/c/b/");
        assert_eq!(updated.parent_id, Some(id_of(&index, "C")));
    }

    #[tokio::test]
    async fn test_update_parent_cleared_makes_last_tree() {
        let (store, service) = service("A\n  B\nC");
        let index = fresh(&store).await;

        service.update(id_of(&index, "B"), form("B", None)).await.unwrap();

        assert_eq!(shape(&fresh(&store).await), "A C B");
    }

    #[tokio::test]
    async fn test_update_parent_to_descendant_fails() {
        let (store, service) = service("A\n  B");
        let before = store.list_ordered().await.unwrap();
        let index = fresh(&store).await;

        let err = service
            .update(id_of(&index, "A"), form("Renamed", Some(id_of(&index, "B"))))
            .await
            .unwrap_err();

        assert!(matches!(err, TreeError::InvalidMove { .. }));
        assert_eq!(store.list_ordered().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_delete_policies() {
        let (store, service) = service("A\n  B\n    D\n    E\n  C");
        let index = fresh(&store).await;
        let b = id_of(&index, "B");

        let err = service.delete(b, DeletePolicy::Reject).await.unwrap_err();
        assert!(matches!(err, TreeError::HasChildren(_)));

        let outcome = service.delete(b, DeletePolicy::Reparent).await.unwrap();
        let after = fresh(&store).await;
        assert_eq!(shape(&after), "A(D,E,C)");
        assert_eq!(outcome.removed, vec![b]);
        assert_eq!(outcome.reslugged, 2);
        assert_eq!(after.get(id_of(&after, "D")).unwrap().slug, "/a/d/");

        let outcome = service.delete(id_of(&index, "A"), DeletePolicy::Cascade).await.unwrap();
        assert_eq!(outcome.removed.len(), 4);
        assert!(fresh(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_path() {
        let mut nodes = forest("Company\n  About\n  Draft");
        nodes[2].status = PageStatus::Draft;
        let service = TreeAdminService::new(Arc::new(MemoryStore::from_nodes(nodes)));

        let Resolution::Found(page) = service.resolve_path("company/about/").await.unwrap() else {
            panic!("expected a page");
        };
        assert_eq!(page.node.title, "About");
        assert_eq!(page.breadcrumbs.len(), 1);
        assert_eq!(page.breadcrumbs[0].link, "/company/");

        assert_eq!(
            service.resolve_path("/company/about").await.unwrap(),
            Resolution::Redirect("/company/about/".to_owned())
        );
        assert_eq!(service.resolve_path("/company/draft/").await.unwrap(), Resolution::NotFound);
        assert_eq!(service.resolve_path("/missing").await.unwrap(), Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_resolve_path_by_override() {
        let mut nodes = forest("Company\n  About");
        nodes[1].slug_override = Some("/about-us/".to_owned());
        let service = TreeAdminService::new(Arc::new(MemoryStore::from_nodes(nodes)));

        assert!(matches!(
            service.resolve_path("/about-us/").await.unwrap(),
            Resolution::Found(ResolvedPage { node, .. }) if node.id == 2
        ));
    }

    #[tokio::test]
    async fn test_sitemap_excludes_private_and_drafts() {
        let mut nodes = forest("A\n  B\n  C\nD");
        nodes[1].login_required = true;
        nodes[2].status = PageStatus::Archive;
        let service = TreeAdminService::new(Arc::new(MemoryStore::from_nodes(nodes)));

        let titles: Vec<String> = service.sitemap().await.unwrap().into_iter().map(|n| n.title).collect();

        assert_eq!(titles, vec!["A", "D"]);
    }

    #[tokio::test]
    async fn test_navigation_with_manual_entries() {
        let (_, service) = service("A\n  B");
        let manual = vec![ManualEntry {
            label: "Shop".to_owned(),
            link: "/shop/".to_owned(),
            children: Vec::new(),
        }];

        let items = service.navigation(PageStatus::NAVIGATION, &manual).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Shop");
        assert_eq!(items[1].children[0].title, "B");
    }

    #[tokio::test]
    async fn test_concurrent_moves_keep_invariants() {
        let (store, service) = service("A\n  B\n  C\n  D\nE\n  F\n  G\nH\n  I");
        let service = Arc::new(service);
        let index = fresh(&store).await;
        let ids = |t: &str| id_of(&index, t);

        let (first, second, third) = tokio::join!(
            service.move_direction(ids("C"), Direction::Right),
            service.move_direction(ids("G"), Direction::Up),
            service.move_node(ids("I"), ids("A"), MovePosition::LastChildOf),
        );
        first.unwrap();
        second.unwrap();
        third.unwrap();

        let after = fresh(&store).await;
        assert_eq!(shape(&after), "A(B(C),D,I) E(G,F) H");
        assert_eq!(after.get(ids("I")).unwrap().slug, "/a/i/");
    }

    #[tokio::test]
    async fn test_concurrent_root_creates_get_distinct_trees() {
        let (store, service) = service("A");
        let service = Arc::new(service);
        service.snapshot().await.unwrap();

        let (x, y) = tokio::join!(service.create(form("X", None)), service.create(form("Y", None)));
        let (x, y) = (x.unwrap(), y.unwrap());

        assert_ne!(x.tree_id, y.tree_id);
        assert_eq!(fresh(&store).await.roots().len(), 3);
    }

    /// Store whose slug writes always fail.
    struct BrokenSlugs(MemoryStore);

    #[async_trait::async_trait]
    impl NodeStore for BrokenSlugs {
        async fn list_ordered(&self) -> Result<Vec<PageNode>, StoreError> {
            self.0.list_ordered().await
        }

        async fn get(&self, id: NodeId) -> Result<PageNode, StoreError> {
            self.0.get(id).await
        }

        async fn insert(&self, draft: &NodeDraft, shifts: &[tp_store::BoundsUpdate]) -> Result<PageNode, StoreError> {
            self.0.insert(draft, shifts).await
        }

        async fn update_bounds(&self, updates: &[tp_store::BoundsUpdate]) -> Result<(), StoreError> {
            self.0.update_bounds(updates).await
        }

        async fn update_slugs(&self, _updates: &[SlugUpdate]) -> Result<(), StoreError> {
            Err(StoreError::new(tp_store::StoreErrorKind::Unavailable).with_backend("Broken"))
        }

        async fn update_content(&self, id: NodeId, content: &PageContent) -> Result<PageNode, StoreError> {
            self.0.update_content(id, content).await
        }

        async fn remove(&self, ids: &[NodeId], shifts: &[tp_store::BoundsUpdate]) -> Result<(), StoreError> {
            self.0.remove(ids, shifts).await
        }

        fn reads(&self) -> u64 {
            self.0.reads()
        }
    }

    /// Yields before every call, like a store awaiting a connection.
    struct YieldingStore(MemoryStore);

    #[async_trait::async_trait]
    impl NodeStore for YieldingStore {
        async fn list_ordered(&self) -> Result<Vec<PageNode>, StoreError> {
            tokio::task::yield_now().await;
            self.0.list_ordered().await
        }

        async fn get(&self, id: NodeId) -> Result<PageNode, StoreError> {
            self.0.get(id).await
        }

        async fn insert(&self, draft: &NodeDraft, shifts: &[BoundsUpdate]) -> Result<PageNode, StoreError> {
            tokio::task::yield_now().await;
            self.0.insert(draft, shifts).await
        }

        async fn update_bounds(&self, updates: &[BoundsUpdate]) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.update_bounds(updates).await
        }

        async fn update_slugs(&self, updates: &[SlugUpdate]) -> Result<(), StoreError> {
            self.0.update_slugs(updates).await
        }

        async fn update_content(&self, id: NodeId, content: &PageContent) -> Result<PageNode, StoreError> {
            self.0.update_content(id, content).await
        }

        async fn remove(&self, ids: &[NodeId], shifts: &[BoundsUpdate]) -> Result<(), StoreError> {
            tokio::task::yield_now().await;
            self.0.remove(ids, shifts).await
        }

        fn reads(&self) -> u64 {
            self.0.reads()
        }
    }

    fn root_form(title: &str) -> PageForm {
        PageForm {
            parent_id: None,
            content: PageContent {
                title: title.to_owned(),
                ..PageContent::default()
            },
        }
    }

    async fn settled_tree_ids(service: &TreeAdminService) -> Vec<TreeId> {
        let after = service.snapshot().await.unwrap();
        after.check_invariants().unwrap();
        after.roots().iter().map(|r| r.tree_id).collect()
    }

    #[tokio::test]
    async fn test_root_create_during_tree_merging_move_keeps_ids_gapless() {
        let store = Arc::new(YieldingStore(MemoryStore::from_nodes(forest("A\nB\n  X"))));
        let service = TreeAdminService::new(store as Arc<dyn NodeStore>);
        service.snapshot().await.unwrap();

        let (moved, created) = tokio::join!(
            service.move_node(1, 3, MovePosition::LastChildOf),
            service.create(root_form("N")),
        );

        moved.unwrap();
        created.unwrap();
        assert_eq!(settled_tree_ids(&service).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_root_create_during_root_delete_keeps_ids_gapless() {
        let store = Arc::new(YieldingStore(MemoryStore::from_nodes(forest("A\n  C\nB"))));
        let service = TreeAdminService::new(store as Arc<dyn NodeStore>);
        service.snapshot().await.unwrap();

        let (deleted, created) = tokio::join!(
            service.delete(1, DeletePolicy::Cascade),
            service.create(root_form("N")),
        );

        deleted.unwrap();
        created.unwrap();
        assert_eq!(settled_tree_ids(&service).await, vec![1, 2]);
    }

    #[test]
    fn test_renumbering_plans_claim_next_tree() {
        let index = crate::testing::index("A\nB\n  X\n  Y");
        let merge = plan_move(&index, 1, 3, MovePosition::LastChildOf).unwrap();
        let drop_root = plan_delete(&index, 1, DeletePolicy::Reject).unwrap();
        let swap = plan_move(&index, 4, 3, MovePosition::LeftOf).unwrap();

        assert!(merge.trees(&index).contains(&3));
        assert!(drop_root.trees(&index).contains(&3));
        assert_eq!(swap.trees(&index), BTreeSet::from([2]));
    }

    #[tokio::test]
    async fn test_failed_slug_write_keeps_committed_bounds() {
        let store = Arc::new(BrokenSlugs(MemoryStore::from_nodes(forest("A\n  B\nC"))));
        let service = TreeAdminService::new(Arc::clone(&store) as Arc<dyn NodeStore>);

        let err = service.move_node(2, 3, MovePosition::FirstChildOf).await.unwrap_err();

        assert!(matches!(err, TreeError::Storage(_)));
        let after = service.snapshot().await.unwrap();
        assert_eq!(shape(&after), "A C(B)");
        assert_eq!(after.get(2).unwrap().slug, "/a/b/");
    }
}
