use lifeline::{Tracked, WeakSet};
use proptest::prelude::*;
use std::collections::HashSet;

const SLOTS: usize = 8;

#[derive(Debug, Clone)]
enum Operation {
    Insert(usize),
    Remove(usize),
    Release(usize),
    Contains(usize),
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        (0..SLOTS).prop_map(Operation::Insert),
        (0..SLOTS).prop_map(Operation::Remove),
        (0..SLOTS).prop_map(Operation::Release),
        (0..SLOTS).prop_map(Operation::Contains),
    ]
}

proptest! {
    #[test]
    fn test_weak_set_matches_model(ops in proptest::collection::vec(operation(), 1..120)) {
        // Slot `i` holds the only strong handle to its current object;
        // releasing it replaces the object with a fresh one.
        let mut objects: Vec<Tracked<usize>> = (0..SLOTS).map(Tracked::new).collect();
        let mut generations = vec![0_usize; SLOTS];
        let mut model: HashSet<(usize, usize)> = HashSet::new();
        let mut set = WeakSet::new();

        for op in ops {
            match op {
                Operation::Insert(i) => {
                    let fresh = model.insert((i, generations[i]));
                    prop_assert_eq!(set.insert(&objects[i]), fresh);
                }
                Operation::Remove(i) => {
                    let present = model.remove(&(i, generations[i]));
                    prop_assert_eq!(set.remove(&objects[i]), present);
                }
                Operation::Release(i) => {
                    model.remove(&(i, generations[i]));
                    generations[i] += 1;
                    objects[i] = Tracked::new(i);
                }
                Operation::Contains(i) => {
                    let expected = model.contains(&(i, generations[i]));
                    prop_assert_eq!(set.contains(&objects[i]), expected);
                }
            }
            prop_assert_eq!(set.len(), model.len());
        }

        let mut live: Vec<usize> = set.iter().map(|object| *object).collect();
        live.sort_unstable();
        let mut expected: Vec<usize> = model.iter().map(|&(i, _)| i).collect();
        expected.sort_unstable();
        prop_assert_eq!(live, expected);
    }
}
