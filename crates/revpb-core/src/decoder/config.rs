/// Configuration for the decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Deepest allowed nesting of messages and groups (root is depth 0)
    pub max_depth: usize,
    /// Minimum chunk length before a packed interpretation is attempted
    pub min_packed_len: usize,
    /// Highest tolerated share of whitespace characters in probable text
    pub max_control_ratio: f64,
    /// Lowest required share of ASCII alphanumerics in probable text
    pub min_alnum_ratio: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            min_packed_len: 5,
            max_control_ratio: 0.1,
            min_alnum_ratio: 0.5,
        }
    }
}

impl DecoderConfig {
    /// Creates a decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the minimum length for the packed attempt
    pub fn min_packed_len(mut self, len: usize) -> Self {
        self.min_packed_len = len;
        self
    }

    /// Sets the whitespace ratio threshold
    pub fn max_control_ratio(mut self, ratio: f64) -> Self {
        self.max_control_ratio = ratio;
        self
    }

    /// Sets the alphanumeric ratio threshold
    pub fn min_alnum_ratio(mut self, ratio: f64) -> Self {
        self.min_alnum_ratio = ratio;
        self
    }

    /// Printability heuristic: is `text` more likely prose than binary noise?
    ///
    /// Rejects text whose whitespace share exceeds `max_control_ratio` or
    /// whose alphanumeric share is below `min_alnum_ratio`. Empty text is
    /// never probable.
    pub fn is_probable_string(&self, text: &str) -> bool {
        let mut total = 0usize;
        let mut alnum = 0usize;
        let mut control = 0usize;

        for c in text.chars() {
            total += 1;
            if c.is_ascii_alphanumeric() {
                alnum += 1;
            } else if matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c') {
                control += 1;
            }
        }

        if total == 0 {
            return false;
        }

        let total = total as f64;
        control as f64 / total <= self.max_control_ratio
            && alnum as f64 / total >= self.min_alnum_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.max_depth, 100);
        assert_eq!(config.min_packed_len, 5);
    }

    #[test]
    fn test_builder() {
        let config = DecoderConfig::new()
            .max_depth(3)
            .min_packed_len(8);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.min_packed_len, 8);
    }

    #[test]
    fn test_probable_string() {
        let config = DecoderConfig::default();
        assert!(config.is_probable_string("hg"));
        assert!(config.is_probable_string("Phone Book"));
        assert!(config.is_probable_string("Alex Ivanov"));

        assert!(!config.is_probable_string(""));
        assert!(!config.is_probable_string("a b c d"));
        assert!(!config.is_probable_string("!!!??"));
    }
}
