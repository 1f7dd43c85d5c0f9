/// Issues human-readable object ids of the form `YYYYMMDD-HH-MM.NNN`.
///
/// The datestamp prefix is fixed at tracker construction; the counter makes
/// every id unique within one tracker instance and is never reused.
#[derive(Debug)]
pub struct ObjectIdGenerator {
    prefix: String,
    next: u32,
}

impl ObjectIdGenerator {
    pub fn new() -> Self {
        Self::with_prefix(chrono::Local::now().format("%Y%m%d-%H-%M").to_string())
    }

    pub fn with_prefix(prefix: String) -> Self {
        Self { prefix, next: 0 }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}.{:03}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_formatted() {
        let mut gen = ObjectIdGenerator::with_prefix("20260801-14-30".into());
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(a, "20260801-14-30.000");
        assert_eq!(b, "20260801-14-30.001");
        assert_ne!(a, b);
    }

    #[test]
    fn counter_survives_many_births() {
        let mut gen = ObjectIdGenerator::with_prefix("p".into());
        let ids: std::collections::HashSet<_> = (0..1500).map(|_| gen.next_id()).collect();
        assert_eq!(ids.len(), 1500);
    }
}
