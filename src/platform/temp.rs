//! Unique sibling names for atomic writes and rename probes.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique sibling of `target` in the same directory.
/// Pattern: <prefix>.<pid>.<nanos>.<seq>
pub fn unique_sibling_name(target: &Path, prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = format!("{prefix}.{pid}.{nanos}.{seq}");
    target.parent().unwrap_or_else(|| Path::new(".")).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn uniqueness_concurrent() {
        let target = Path::new("dummy.xml");
        let mut handles = Vec::new();
        for _ in 0..32 {
            let t = target.to_path_buf();
            handles.push(thread::spawn(move || unique_sibling_name(&t, ".junction_move.tmp")));
        }
        let mut set = HashSet::new();
        for h in handles {
            let p = h.join().unwrap();
            assert!(set.insert(p));
        }
        assert_eq!(set.len(), 32);
    }
}
