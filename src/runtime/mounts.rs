//! Bind-mount derivation.
//!
//! Tasks declare file-level inputs (read-only) and outputs (read-write);
//! Docker wants directory-level bind mounts. Each volume is folded onto its
//! parent directory and overlapping mounts are coalesced, with one twist: a
//! read-only input whose host directory differs from the writable mount
//! already covering its container directory must still be reachable, so it
//! is added as an extra file-granular read-only mount on top.

use crate::rpc::protocol::Volume;

/// A host path bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// Derives the bind mounts for a container. Outputs are packed first so that
/// writable directories win the coalescing; inputs layer on top.
pub fn bind_mounts(inputs: &[Volume], outputs: &[Volume]) -> Vec<BindMount> {
    let mut mounts = Vec::new();

    for output in outputs {
        add_volume(&mut mounts, &output.host_path, &output.container_path, false);
    }
    for input in inputs {
        add_volume(&mut mounts, &input.host_path, &input.container_path, true);
    }

    mounts
}

fn add_volume(mounts: &mut Vec<BindMount>, host_path: &str, container_path: &str, read_only: bool) {
    let host_dir = parent_dir(host_path);
    let container_dir = parent_dir(container_path);

    for i in 0..mounts.len() {
        // The new path is already covered by an existing mount.
        if container_path.starts_with(&mounts[i].container_path) {
            // A read-only file from a different host directory cannot be
            // reached through that mount; overlay it file-granular.
            if read_only && host_dir != mounts[i].host_path {
                let overlay = BindMount {
                    host_path: host_path.to_string(),
                    container_path: container_path.to_string(),
                    read_only,
                };
                if !mounts.contains(&overlay) {
                    mounts.push(overlay);
                }
            }
            return;
        }

        // The existing mount is inside the new directory; widen it in place.
        if mounts[i].container_path.starts_with(container_dir) {
            mounts[i].host_path = host_dir.to_string();
            mounts[i].container_path = container_dir.to_string();
            return;
        }
    }

    mounts.push(BindMount {
        host_path: host_dir.to_string(),
        container_path: container_dir.to_string(),
        read_only,
    });
}

/// Parent directory of a slash-separated path; the root stays the root.
fn parent_dir(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => path,
    }
}
