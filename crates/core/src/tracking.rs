//! Read-dependency tracking
//!
//! Reactive queries need to know which objects an evaluation looked at so
//! they can re-run when one of them changes. Tracked accessors call
//! [`record_read`]; [`track`] collects those ids for the duration of a
//! closure. [`untracked`] suspends collection, which is how third-party
//! predicates are kept from adding dependencies.
//!
//! Tracking is per thread and nests: an inner `track` collects its own set
//! and does not leak into the outer one.

use crate::ids::ObjectId;
use std::cell::RefCell;
use std::collections::BTreeSet;

#[derive(Default)]
struct Frame {
    reads: BTreeSet<ObjectId>,
    suspended: usize,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

struct FrameGuard;

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

struct SuspendGuard;

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            if let Some(frame) = frames.borrow_mut().last_mut() {
                frame.suspended = frame.suspended.saturating_sub(1);
            }
        });
    }
}

/// Run `f`, returning its result and the set of object ids it read
pub fn track<R>(f: impl FnOnce() -> R) -> (R, BTreeSet<ObjectId>) {
    FRAMES.with(|frames| frames.borrow_mut().push(Frame::default()));
    let guard = FrameGuard;
    let result = f();
    let reads = FRAMES.with(|frames| {
        frames
            .borrow_mut()
            .last_mut()
            .map(|frame| std::mem::take(&mut frame.reads))
            .unwrap_or_default()
    });
    drop(guard);
    (result, reads)
}

/// Run `f` without recording reads into the enclosing [`track`] scope
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let active = FRAMES.with(|frames| match frames.borrow_mut().last_mut() {
        Some(frame) => {
            frame.suspended += 1;
            true
        }
        None => false,
    });
    let _guard = active.then_some(SuspendGuard);
    f()
}

/// Record that `id` was read by the current evaluation
///
/// No-op outside [`track`] or inside [`untracked`].
pub fn record_read(id: &ObjectId) {
    FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            if frame.suspended == 0 {
                frame.reads.insert(id.clone());
            }
        }
    });
}

/// True while inside a [`track`] scope that is not suspended
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| {
        frames
            .borrow()
            .last()
            .map(|frame| frame.suspended == 0)
            .unwrap_or(false)
    })
}
