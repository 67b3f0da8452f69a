/// Base seed for runs that do not configure one, drawn from the thread-local entropy source.
pub fn entropy_base_seed() -> u64 {
    rand::random::<u64>()
}

#[cfg(test)]
mod test_util {
    use super::*;

    #[test]
    fn test_entropy_base_seeds_differ() {
        let draws: Vec<u64> = (0..4).map(|_| entropy_base_seed()).collect();
        assert!(draws.windows(2).any(|pair| pair[0] != pair[1]));
    }
}
