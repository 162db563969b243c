//! Content store operations inside a transaction.

use std::collections::BTreeSet;

use fedpost_core::{Identity, Post, PostData, PostId, RelationKind, Server};
use fedpost_store::StoreTx;

use crate::error::Result;

/// The existing post at (server, path), or an unsaved shell for it.
pub(crate) fn resolve_or_create(tx: &dyn StoreTx, server: &Server, path: &str) -> Result<Post> {
    Ok(tx
        .post_by_path(&server.name, path)?
        .unwrap_or_else(|| Post::shell(server.id, &server.name, path)))
}

/// Persist `data` as the post's content. Inserts a shell, updates a saved
/// post and refreshes its modification time.
pub(crate) fn save(tx: &mut dyn StoreTx, post: &mut Post, data: PostData, now: i64) -> Result<PostId> {
    post.data = data;
    post.modified_at = now;
    match post.id {
        Some(id) => {
            tx.update_post(post)?;
            Ok(id)
        }
        None => {
            post.created_at = now;
            let id = tx.insert_post(post)?;
            post.id = Some(id);
            Ok(id)
        }
    }
}

/// Identities with a `wrote` relation to the post.
pub(crate) fn authors(tx: &dyn StoreTx, post_id: PostId) -> Result<BTreeSet<Identity>> {
    Ok(tx
        .users_related(RelationKind::Wrote, post_id)?
        .into_iter()
        .map(|u| u.identity)
        .collect())
}

/// Depth-first comment tree under `root`: siblings oldest first, each
/// comment followed by its replies. Depth starts at 1.
pub(crate) fn comment_tree(tx: &dyn StoreTx, root: PostId) -> Result<Vec<(Post, usize)>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::from([root]);
    walk(tx, root, 1, &mut visited, &mut out)?;
    Ok(out)
}

fn walk(
    tx: &dyn StoreTx,
    parent: PostId,
    depth: usize,
    visited: &mut BTreeSet<PostId>,
    out: &mut Vec<(Post, usize)>,
) -> Result<()> {
    for child in tx.posts_related(RelationKind::Comments, parent)? {
        let Some(id) = child.id else { continue };
        // A post can be reachable twice only through a cycle.
        if !visited.insert(id) {
            continue;
        }
        out.push((child, depth));
        walk(tx, id, depth + 1, visited, out)?;
    }
    Ok(())
}
