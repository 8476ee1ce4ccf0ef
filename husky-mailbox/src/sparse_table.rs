/// Two-level sparse table keyed by `(channel, progress)`.
///
/// `get_mut(c, p)` grows the table to `c + 1` rows and, within row `c`,
/// `p + 1` columns, default-constructing intervening cells. Growth is a
/// `Vec::resize_with` under the caller's own lock, so a cell's contents are
/// never observed mid-move: callers only ever reach a cell while already
/// holding whatever lock guards the table (spec.md 3, "Key sparse table").
pub struct KeySparseTable<T> {
    rows: Vec<Vec<T>>,
}

impl<T: Default> KeySparseTable<T> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn get_mut(&mut self, channel: usize, progress: usize) -> &mut T {
        if self.rows.len() <= channel {
            self.rows.resize_with(channel + 1, Vec::new);
        }
        let row = &mut self.rows[channel];
        if row.len() <= progress {
            row.resize_with(progress + 1, T::default);
        }
        &mut row[progress]
    }
}

impl<T: Default> Default for KeySparseTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_mut_grows_lazily_and_default_constructs() {
        let mut table: KeySparseTable<i32> = KeySparseTable::new();
        *table.get_mut(2, 3) = 7;
        assert_eq!(*table.get_mut(2, 3), 7);
        assert_eq!(*table.get_mut(0, 0), 0);
        assert_eq!(*table.get_mut(2, 0), 0);
    }
}
