use super::record::MftRecord;

/// Slab-allocated cell holding one parsed record plus its raw FRS bytes.
/// Freed cells are recycled through the free list so a walk over millions of
/// records keeps reusing the same allocations
#[derive(Debug)]
pub(crate) struct RecordCell {
    pub(crate) record: MftRecord,
    pub(crate) raw: Vec<u8>,
}

/// Handle into the store. Never dangles: freed cells leave a `None` slot and
/// handles are only held by the walker's segment map
pub(crate) type RecordHandle = usize;

#[derive(Debug, Default)]
pub(crate) struct RecordStore {
    cells: Vec<Option<RecordCell>>,
    free_list: Vec<RecordHandle>,
    live: usize,
}

impl RecordStore {
    pub(crate) fn new() -> RecordStore {
        RecordStore {
            cells: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// O(1) amortized: recycled cells first, then the high-water mark
    pub(crate) fn allocate(&mut self, record: MftRecord, raw: Vec<u8>) -> RecordHandle {
        self.live += 1;
        let cell = RecordCell { record, raw };
        match self.free_list.pop() {
            Some(handle) => {
                self.cells[handle] = Some(cell);
                handle
            }
            None => {
                self.cells.push(Some(cell));
                self.cells.len() - 1
            }
        }
    }

    pub(crate) fn free(&mut self, handle: RecordHandle) {
        if handle < self.cells.len() && self.cells[handle].is_some() {
            self.cells[handle] = None;
            self.free_list.push(handle);
            self.live -= 1;
        }
    }

    pub(crate) fn get(&self, handle: RecordHandle) -> Option<&RecordCell> {
        self.cells.get(handle).and_then(|cell| cell.as_ref())
    }

    pub(crate) fn get_mut(&mut self, handle: RecordHandle) -> Option<&mut RecordCell> {
        self.cells.get_mut(handle).and_then(|cell| cell.as_mut())
    }

    /// Currently live cell count, drives the walker's sweep decision
    pub(crate) fn allocated_cells(&self) -> usize {
        self.live
    }

    /// Handles of every live cell. No iteration order guarantee
    pub(crate) fn live_handles(&self) -> Vec<RecordHandle> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(handle, cell)| cell.as_ref().map(|_| handle))
            .collect()
    }
}
