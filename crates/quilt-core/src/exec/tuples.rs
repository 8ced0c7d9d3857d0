//! Cross-product enumeration.

/// Iterator over the full cross product of several candidate lists.
///
/// With lists of sizes 3 and 2, six combinations are produced. Any empty
/// list yields no combinations at all; zero lists yield the single empty
/// combination.
#[derive(Debug)]
pub struct CrossProduct<T> {
    lists: Vec<Vec<T>>,
    indexes: Vec<usize>,
    done: bool,
}

/// Enumerate the full cross product of the given lists.
pub fn cross_product<T: Clone>(lists: Vec<Vec<T>>) -> CrossProduct<T> {
    let done = lists.iter().any(Vec::is_empty);
    CrossProduct {
        indexes: vec![0; lists.len()],
        lists,
        done,
    }
}

impl<T: Clone> Iterator for CrossProduct<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item: Vec<T> = self
            .lists
            .iter()
            .zip(self.indexes.iter())
            .map(|(list, &i)| list[i].clone())
            .collect();

        // Advance the odometer, least significant position last.
        self.done = true;
        for pos in (0..self.lists.len()).rev() {
            self.indexes[pos] += 1;
            if self.indexes[pos] < self.lists[pos].len() {
                self.done = false;
                break;
            }
            self.indexes[pos] = 0;
        }
        Some(item)
    }
}
