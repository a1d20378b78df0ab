//! Runs in its own process: flipping the global shutdown flag cannot leak into other tests.

use junction_move::{shutdown, CancelToken, MoveError};

#[test]
fn tokens_observe_global_shutdown() {
    let t = CancelToken::new();
    assert!(!t.is_cancelled());
    shutdown::request();
    assert!(shutdown::is_requested());
    assert!(t.is_cancelled());
    assert!(matches!(t.check(), Err(MoveError::Cancelled)));
}
