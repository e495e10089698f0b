//! Region quadtree over feature envelopes
//!
//! Covers the canonical world (−180..180 longitude, −90..90 latitude). Each
//! item is stored in the deepest node whose bounds fully contain its
//! envelope, so large or boundary-straddling envelopes stay near the root.
//! Envelopes that leave the world bounds (unwrapped longitudes past ±180°)
//! are kept in a separate root-level list that every probe scans.
//!
//! A node splits into four children once it holds more than
//! `node_capacity` items, unless it is already at `max_depth`.

use featuredb_core::{BBox, FeatureId};

/// World bounds covered by the tree
pub const WORLD: BBox = BBox {
    min_lng: -180.0,
    min_lat: -90.0,
    max_lng: 180.0,
    max_lat: 90.0,
};

#[derive(Debug)]
struct Node {
    bounds: BBox,
    depth: usize,
    items: Vec<(FeatureId, BBox)>,
    children: Option<Box<[Node; 4]>>,
}

impl Node {
    fn new(bounds: BBox, depth: usize) -> Self {
        Self {
            bounds,
            depth,
            items: Vec::new(),
            children: None,
        }
    }

    fn quadrants(&self) -> [BBox; 4] {
        let b = self.bounds;
        let mid_lng = (b.min_lng + b.max_lng) / 2.0;
        let mid_lat = (b.min_lat + b.max_lat) / 2.0;
        [
            BBox::new(b.min_lng, mid_lat, mid_lng, b.max_lat),
            BBox::new(mid_lng, mid_lat, b.max_lng, b.max_lat),
            BBox::new(b.min_lng, b.min_lat, mid_lng, mid_lat),
            BBox::new(mid_lng, b.min_lat, b.max_lng, mid_lat),
        ]
    }

    fn child_for(&mut self, envelope: &BBox) -> Option<&mut Node> {
        self.children
            .as_mut()?
            .iter_mut()
            .find(|c| c.bounds.contains_bbox(envelope))
    }

    fn insert(&mut self, id: FeatureId, envelope: BBox, capacity: usize, max_depth: usize) {
        if let Some(child) = self.child_for(&envelope) {
            child.insert(id, envelope, capacity, max_depth);
            return;
        }
        self.items.push((id, envelope));
        if self.children.is_none() && self.items.len() > capacity && self.depth < max_depth {
            self.split(capacity, max_depth);
        }
    }

    fn split(&mut self, capacity: usize, max_depth: usize) {
        let depth = self.depth + 1;
        let [a, b, c, d] = self.quadrants();
        self.children = Some(Box::new([
            Node::new(a, depth),
            Node::new(b, depth),
            Node::new(c, depth),
            Node::new(d, depth),
        ]));
        let items = std::mem::take(&mut self.items);
        for (id, envelope) in items {
            self.insert(id, envelope, capacity, max_depth);
        }
    }

    fn remove(&mut self, id: FeatureId, envelope: &BBox) -> bool {
        if let Some(pos) = self.items.iter().position(|(item, _)| *item == id) {
            self.items.swap_remove(pos);
            return true;
        }
        match self.child_for(envelope) {
            Some(child) => child.remove(id, envelope),
            None => false,
        }
    }

    fn query(&self, region: &BBox, out: &mut Vec<FeatureId>) {
        if !self.bounds.intersects(region) {
            return;
        }
        out.extend(
            self.items
                .iter()
                .filter(|(_, envelope)| envelope.intersects(region))
                .map(|(id, _)| *id),
        );
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(region, out);
            }
        }
    }

    fn estimate(&self, region: &BBox) -> usize {
        if !self.bounds.intersects(region) {
            return 0;
        }
        let below = self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(|c| c.estimate(region)).sum());
        self.items.len() + below
    }
}

/// Spatial index of feature envelopes
#[derive(Debug)]
pub struct Quadtree {
    root: Node,
    outside: Vec<(FeatureId, BBox)>,
    node_capacity: usize,
    max_depth: usize,
    len: usize,
}

impl Quadtree {
    /// Empty tree with the given split parameters
    pub fn new(node_capacity: usize, max_depth: usize) -> Self {
        Self {
            root: Node::new(WORLD, 0),
            outside: Vec::new(),
            node_capacity: node_capacity.max(1),
            max_depth,
            len: 0,
        }
    }

    /// Index `id` under `envelope`
    pub fn insert(&mut self, id: FeatureId, envelope: BBox) {
        if WORLD.contains_bbox(&envelope) {
            self.root
                .insert(id, envelope, self.node_capacity, self.max_depth);
        } else {
            self.outside.push((id, envelope));
        }
        self.len += 1;
    }

    /// Remove `id`, which must have been inserted under `envelope`
    pub fn remove(&mut self, id: FeatureId, envelope: &BBox) -> bool {
        let removed = if WORLD.contains_bbox(envelope) {
            self.root.remove(id, envelope)
        } else if let Some(pos) = self.outside.iter().position(|(item, _)| *item == id) {
            self.outside.swap_remove(pos);
            true
        } else {
            false
        };
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Ids whose envelope intersects `region`
    ///
    /// An id is reported at most once per call.
    pub fn query(&self, region: &BBox) -> Vec<FeatureId> {
        let mut out = Vec::new();
        self.root.query(region, &mut out);
        out.extend(
            self.outside
                .iter()
                .filter(|(_, envelope)| envelope.intersects(region))
                .map(|(id, _)| *id),
        );
        out
    }

    /// Upper bound on `query(region).len()` from node sizes alone
    pub fn estimate(&self, region: &BBox) -> usize {
        self.root.estimate(region) + self.outside.len()
    }

    /// Number of indexed items
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every item
    pub fn clear(&mut self) {
        self.root = Node::new(WORLD, 0);
        self.outside.clear();
        self.len = 0;
    }
}
