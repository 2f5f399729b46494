use std::sync::{Arc, Mutex, Weak};

use geo::Rect;

use crate::{
    buffer::ChunkBuffer,
    components::{
        bands::BandCollection,
        bounds::SpaceTimeWindow,
        view::{ChunkGrid, ChunkId, STReference},
    },
    datetime::TimePoint,
    errors::Result,
};

/// Geometry and graph wiring shared by every cube node.
///
/// Parents are owning handles, children weak back-references, so the
/// operator graph has exactly one ownership spine.
pub struct CubeCore {
    stref: STReference,
    bands: BandCollection,
    grid: ChunkGrid,
    parents: Vec<Arc<dyn Cube>>,
    children: Mutex<Vec<Weak<dyn Cube>>>,
}

impl CubeCore {
    pub fn new(
        stref: STReference,
        bands: BandCollection,
        chunk_size: [usize; 3],
        parents: Vec<Arc<dyn Cube>>,
    ) -> Self {
        let grid = ChunkGrid::new(stref.size(), chunk_size);
        Self {
            stref,
            bands,
            grid,
            parents,
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn stref(&self) -> &STReference {
        &self.stref
    }

    pub fn bands(&self) -> &BandCollection {
        &self.bands
    }

    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    pub fn parents(&self) -> &[Arc<dyn Cube>] {
        &self.parents
    }

    pub fn add_child(&self, child: Weak<dyn Cube>) {
        self.children.lock().unwrap().push(child);
    }

    pub fn children(&self) -> Vec<Arc<dyn Cube>> {
        self.children
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

/// The pull contract every cube node implements.
///
/// `read_chunk` materializes exactly one chunk, pulling whatever it needs
/// from the parent cubes. It must be deterministic for a given graph, must
/// return an empty buffer for ids outside `[0, count_chunks())`, and must be
/// safe to call concurrently for disjoint ids.
pub trait Cube: Send + Sync {
    fn core(&self) -> &CubeCore;

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer>;

    /// Declarative description that the graph factory can rebuild the cube
    /// from.
    fn describe(&self) -> serde_json::Value;

    fn st_ref(&self) -> &STReference {
        self.core().stref()
    }

    fn bands(&self) -> &BandCollection {
        self.core().bands()
    }

    fn grid(&self) -> &ChunkGrid {
        self.core().grid()
    }

    fn chunk_size(&self) -> [usize; 3] {
        self.grid().chunk_size()
    }

    fn count_chunks(&self) -> usize {
        self.grid().count()
    }

    fn count_chunks_t(&self) -> usize {
        self.grid().count_t()
    }

    fn count_chunks_y(&self) -> usize {
        self.grid().count_y()
    }

    fn count_chunks_x(&self) -> usize {
        self.grid().count_x()
    }

    /// Pixel shape `[t, y, x]` of chunk `id`, truncated at cube boundaries.
    fn shape_of_chunk(&self, id: ChunkId) -> [usize; 3] {
        self.grid().shape_of(id)
    }

    /// Buffer shape `[bands, t, y, x]` of chunk `id`.
    fn buffer_shape_of_chunk(&self, id: ChunkId) -> [usize; 4] {
        let [st, sy, sx] = self.shape_of_chunk(id);
        [self.bands().count(), st, sy, sx]
    }

    /// Space-time box of chunk `id`; the temporal end is exclusive.
    fn bounds_from_chunk(&self, id: ChunkId) -> Option<SpaceTimeWindow> {
        let stref = self.st_ref();
        let offset = self.grid().offset_of(id)?;
        let shape = self.grid().shape_of(id);
        let left = stref.left + offset[2] as f64 * stref.dx();
        let right = left + shape[2] as f64 * stref.dx();
        let top = stref.top - offset[1] as f64 * stref.dy();
        let bottom = top - shape[1] as f64 * stref.dy();
        Some(SpaceTimeWindow::new(
            Rect::new((left, bottom), (right, top)),
            stref.srs.clone(),
            stref.time_at(offset[0]),
            stref.time_at(offset[0] + shape[0]),
        ))
    }

    /// Chunk containing the world coordinate `(t, x, y)`; coordinates
    /// outside the cube produce an id outside `[0, count_chunks())`.
    fn find_chunk_that_contains(&self, t: TimePoint, x: f64, y: f64) -> ChunkId {
        let stref = self.st_ref();
        let it = stref.dt.steps_between(&stref.t0, &t);
        let ix = ((x - stref.left) / stref.dx()).floor() as i64;
        let iy = ((stref.top - y) / stref.dy()).floor() as i64;
        self.grid().chunk_at_pixel([it, iy, ix])
    }

    fn parents(&self) -> &[Arc<dyn Cube>] {
        self.core().parents()
    }

    fn children(&self) -> Vec<Arc<dyn Cube>> {
        self.core().children()
    }
}

/// Registers `child` as a weak back-reference on all of its parents.
pub fn connect_to_parents(child: &Arc<dyn Cube>) {
    for parent in child.parents() {
        parent.core().add_child(Arc::downgrade(child));
    }
}
