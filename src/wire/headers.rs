/// An ordered header multimap that preserves caller-supplied casing.
///
/// HTTP/1.1 treats header names as case-insensitive, but a wire-exact client
/// must emit them exactly as given: some servers and fingerprinting detectors
/// check casing, and scanners rely on it. Lookups are case-insensitive;
/// serialization order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a header, keeping any existing values for the same name.
    /// A name may repeat; repeats serialize as separate lines.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Set a header: replaces the first existing value (case-insensitive
    /// match, position preserved) and drops any further repeats, or appends
    /// when the name is new.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter().position(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(idx) => {
                self.entries[idx].1 = value;
                let mut seen = false;
                self.entries.retain(|(n, _)| {
                    if n.eq_ignore_ascii_case(&name) {
                        let keep = !seen;
                        seen = true;
                        keep
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name` in insertion order, case-insensitive.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// All entries with original casing, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_repeats() {
        let mut h = Headers::new();
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut h = Headers::new();
        h.append("Host", "first.example");
        h.append("Accept", "*/*");
        h.set("host", "second.example");
        let names: Vec<_> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Host", "Accept"]);
        assert_eq!(h.get("Host"), Some("second.example"));
    }

    #[test]
    fn test_set_collapses_repeats() {
        let mut h = Headers::new();
        h.append("X-Test", "a");
        h.append("X-Test", "b");
        h.set("X-Test", "c");
        assert_eq!(h.get_all("X-Test").collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_case_insensitive_get_preserves_casing() {
        let mut h = Headers::new();
        h.append("uSeR-aGeNt", "probe");
        assert_eq!(h.get("User-Agent"), Some("probe"));
        assert_eq!(h.iter().next().unwrap().0, "uSeR-aGeNt");
    }

    #[test]
    fn test_remove() {
        let mut h = Headers::new();
        h.append("A", "1");
        h.append("a", "2");
        h.remove("A");
        assert!(h.is_empty());
    }

    #[test]
    fn test_preserves_insertion_order() {
        let h: Headers =
            [("Host", "x"), ("Accept", "*/*"), ("X-Probe", "1")].into_iter().collect();
        let names: Vec<_> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Host", "Accept", "X-Probe"]);
    }
}
