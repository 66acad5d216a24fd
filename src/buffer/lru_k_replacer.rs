use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Which of the two replacer lists a frame currently lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    /// Fewer than K recorded accesses: backward K-distance is infinite.
    Young,
    /// At least K recorded accesses: ordered by the Kth-most-recent access.
    Kth,
}

#[derive(Debug)]
struct LruKNode {
    /// Timestamps of the most recent accesses, oldest first, capped at K.
    history: VecDeque<Timestamp>,
    evictable: bool,
    queue: Queue,
}

impl LruKNode {
    /// Timestamp of the Kth-most-recent access. Only meaningful once the
    /// node has K entries, i.e. once it sits on the K list.
    fn kth_recent(&self) -> Timestamp {
        *self.history.front().expect("node has no access history")
    }
}

struct ReplacerState {
    nodes: HashMap<FrameId, LruKNode>,
    /// Frames with < K accesses, most recently inserted at the front.
    young: VecDeque<FrameId>,
    /// Frames with >= K accesses, ascending by Kth-most-recent timestamp:
    /// the frame with the largest backward K-distance sits at the front.
    kth: VecDeque<FrameId>,
    current_ts: Timestamp,
    num_evictable: usize,
}

/// LRU-K replacement policy.
///
/// The replacer evicts the frame whose backward K-distance (time since the
/// Kth-most-recent access) is largest. Frames with fewer than K recorded
/// accesses count as infinitely distant and are preferred as victims, oldest
/// insertion first. Keeping those frames on a separate young list means a
/// victim search never has to compute K-distances for frames that do not
/// have K accesses yet.
pub struct LruKReplacer {
    k: usize,
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState {
                nodes: HashMap::new(),
                young: VecDeque::new(),
                kth: VecDeque::new(),
                current_ts: 0,
                num_evictable: 0,
            }),
        }
    }

    /// Records an access to the given frame at the next global timestamp.
    /// A frame's K+1st access promotes it from the young list to the K
    /// list; later accesses re-sort it within the K list.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        let ts = state.current_ts;
        state.current_ts += 1;

        if !state.nodes.contains_key(&frame_id) {
            let mut history = VecDeque::with_capacity(self.k);
            history.push_back(ts);
            state.nodes.insert(
                frame_id,
                LruKNode {
                    history,
                    evictable: false,
                    queue: Queue::Young,
                },
            );
            state.young.push_front(frame_id);
            return;
        }

        let (was_young, now_has_k) = {
            let node = state.nodes.get_mut(&frame_id).unwrap();
            node.history.push_back(ts);
            while node.history.len() > self.k {
                node.history.pop_front();
            }
            let was_young = node.queue == Queue::Young;
            let now_has_k = node.history.len() >= self.k;
            if was_young && now_has_k {
                node.queue = Queue::Kth;
            }
            (was_young, now_has_k)
        };

        if was_young && now_has_k {
            remove_from(&mut state.young, frame_id);
            insert_sorted(&mut state, frame_id);
        } else if !was_young {
            remove_from(&mut state.kth, frame_id);
            insert_sorted(&mut state, frame_id);
        }
    }

    /// Selects and removes a victim frame: the oldest evictable young frame
    /// if any exists, otherwise the evictable K-list frame with the largest
    /// backward K-distance. Returns None when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let victim = state
            .young
            .iter()
            .rev()
            .copied()
            .find(|frame_id| state.nodes[frame_id].evictable)
            .or_else(|| {
                state
                    .kth
                    .iter()
                    .copied()
                    .find(|frame_id| state.nodes[frame_id].evictable)
            })?;

        let node = state.nodes.remove(&victim).unwrap();
        let list = match node.queue {
            Queue::Young => &mut state.young,
            Queue::Kth => &mut state.kth,
        };
        remove_from(list, victim);
        state.num_evictable -= 1;

        Some(victim)
    }

    /// Toggles whether a frame may be chosen as a victim. Calling this for
    /// a frame that was never recorded is a programmer error.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        let changed = {
            let node = state
                .nodes
                .get_mut(&frame_id)
                .unwrap_or_else(|| panic!("set_evictable on untracked {frame_id}"));
            if node.evictable == evictable {
                false
            } else {
                node.evictable = evictable;
                true
            }
        };

        if changed {
            if evictable {
                state.num_evictable += 1;
            } else {
                state.num_evictable -= 1;
            }
        }
    }

    /// Drops a frame from the replacer entirely, e.g. when its page is
    /// deleted. Unknown frames are ignored; removing a frame that is not
    /// evictable is a programmer error.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let Some(node) = state.nodes.get(&frame_id) else {
            return;
        };
        assert!(node.evictable, "remove on non-evictable {frame_id}");

        let node = state.nodes.remove(&frame_id).unwrap();
        let list = match node.queue {
            Queue::Young => &mut state.young,
            Queue::Kth => &mut state.kth,
        };
        remove_from(list, frame_id);
        state.num_evictable -= 1;
    }

    /// Number of evictable frames across both lists.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

fn remove_from(list: &mut VecDeque<FrameId>, frame_id: FrameId) {
    if let Some(pos) = list.iter().position(|&f| f == frame_id) {
        list.remove(pos);
    }
}

/// Inserts a frame into the K list, keeping it ascending by the timestamp
/// of the Kth-most-recent access.
fn insert_sorted(state: &mut ReplacerState, frame_id: FrameId) {
    let key = state.nodes[&frame_id].kth_recent();
    let pos = state
        .kth
        .iter()
        .position(|other| state.nodes[other].kth_recent() > key)
        .unwrap_or(state.kth.len());
    state.kth.insert(pos, frame_id);
}
