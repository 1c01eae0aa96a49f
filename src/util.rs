use std::{
	collections::{HashMap, HashSet},
	hash::BuildHasherDefault,
};

use hashers::fnv::FNV1aHasher64;
use itertools::Itertools;

pub fn hash_set<K>() -> HashSet<K, BuildHasherDefault<FNV1aHasher64>> {
	HashSet::default()
}

pub fn hash_map<K, V>() -> HashMap<K, V, BuildHasherDefault<FNV1aHasher64>> {
	HashMap::default()
}

pub type HashM<K, V> = HashMap<K, V, BuildHasherDefault<FNV1aHasher64>>;
pub type HashS<K> = HashSet<K, BuildHasherDefault<FNV1aHasher64>>;

/// Build an FNV map from any iterator of pairs. Handy for fixed-node tables.
pub fn fixed_map<I>(pairs: I) -> HashM<usize, usize>
where
	I: IntoIterator<Item = (usize, usize)>,
{
	pairs.into_iter().collect()
}

/// Keys of a hash map in ascending order, so iteration never depends on the hasher.
pub(crate) fn sorted_keys<V>(map: &HashM<usize, V>) -> Vec<usize> {
	map.keys().copied().sorted().collect_vec()
}
