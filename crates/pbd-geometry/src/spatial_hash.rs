//! Uniform spatial hash over bounding boxes.
//!
//! Each item is inserted into every cell its box touches; a query
//! returns the candidates sharing at least one cell with the query box.

use crate::Aabb;
use pbd_math::Vec3;
use std::collections::HashMap;

type Cell = (i64, i64, i64);

#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: f64,
    cells: HashMap<Cell, Vec<usize>>,
}

impl SpatialHash {
    /// Build from item boxes; item ids are slice indices.
    pub fn new(cell_size: f64, boxes: &[Aabb]) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        let mut hash = Self {
            cell_size,
            cells: HashMap::new(),
        };
        for (item, aabb) in boxes.iter().enumerate() {
            hash.insert(item, aabb);
        }
        hash
    }

    fn cell_of(&self, p: &Vec3) -> Cell {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    fn cell_range(&self, aabb: &Aabb) -> Vec<Cell> {
        let lo = self.cell_of(&aabb.min);
        let hi = self.cell_of(&aabb.max);
        let mut cells = Vec::new();
        for i in lo.0..=hi.0 {
            for j in lo.1..=hi.1 {
                for k in lo.2..=hi.2 {
                    cells.push((i, j, k));
                }
            }
        }
        cells
    }

    pub fn insert(&mut self, item: usize, aabb: &Aabb) {
        for cell in self.cell_range(aabb) {
            self.cells.entry(cell).or_default().push(item);
        }
    }

    /// Items whose cells intersect `aabb`, sorted and unique.
    pub fn query(&self, aabb: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        for cell in self.cell_range(aabb) {
            if let Some(items) = self.cells.get(&cell) {
                out.extend_from_slice(items);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}
