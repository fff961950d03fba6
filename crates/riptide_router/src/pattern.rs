//! Route template compilation and path matching.
//!
//! Templates are compiled once at registration time into a flat segment
//! sequence that can be matched against request paths without allocation
//! on the miss path.

use crate::error::CompileError;
use std::collections::HashMap;

/// Path parameters captured during a successful match, keyed by the
/// parameter name from the template.
pub type PathParams = HashMap<String, String>;

/// A single compiled template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Fixed text that must match the request segment exactly (case-sensitive).
    Literal(String),
    /// `:name` — captures exactly one non-empty path segment.
    Param(String),
    /// `:name*` or a bare trailing `*` — captures the remainder of the path
    /// (zero or more segments, joined by `/`). Only valid as the last segment.
    Wildcard(String),
}

impl Segment {
    /// Specificity weight of this segment. Literal text outranks a named
    /// parameter, which outranks a wildcard tail.
    fn weight(&self) -> u32 {
        match self {
            Segment::Literal(_) => 3,
            Segment::Param(_) => 1,
            Segment::Wildcard(_) => 0,
        }
    }
}

/// A compiled route template.
///
/// Holds the ordered segment sequence plus a precomputed specificity score
/// used by the router to rank competing matches. Compilation enforces the
/// template invariants: at most one wildcard segment, only in final
/// position, and no duplicate parameter names.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    segments: Vec<Segment>,
    specificity: u32,
}

impl CompiledPattern {
    /// Compiles a route template into a matchable pattern.
    ///
    /// # Arguments
    ///
    /// * `template` - The route template, e.g. `/user/:id` or `/files/:path*`
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] if a wildcard segment appears anywhere but
    /// last, if two segments capture under the same name, or if a `:` segment
    /// carries no name.
    pub fn compile(template: &str) -> Result<Self, CompileError> {
        let mut segments = Vec::new();
        let mut seen_names: Vec<String> = Vec::new();

        let raw: Vec<&str> = normalize(template).split('/').filter(|s| !s.is_empty()).collect();
        let last = raw.len().saturating_sub(1);

        for (idx, part) in raw.iter().enumerate() {
            let segment = if *part == "*" {
                Segment::Wildcard("*".to_string())
            } else if let Some(name) = part.strip_prefix(':') {
                if let Some(name) = name.strip_suffix('*') {
                    if name.is_empty() {
                        return Err(CompileError::EmptyParameter {
                            template: template.to_string(),
                        });
                    }
                    Segment::Wildcard(name.to_string())
                } else {
                    if name.is_empty() {
                        return Err(CompileError::EmptyParameter {
                            template: template.to_string(),
                        });
                    }
                    Segment::Param(name.to_string())
                }
            } else {
                Segment::Literal(part.to_string())
            };

            match &segment {
                Segment::Wildcard(_) if idx != last => {
                    return Err(CompileError::WildcardNotLast {
                        template: template.to_string(),
                    });
                }
                Segment::Param(name) | Segment::Wildcard(name) => {
                    if seen_names.iter().any(|seen| seen == name) {
                        return Err(CompileError::DuplicateParameter {
                            template: template.to_string(),
                            name: name.clone(),
                        });
                    }
                    seen_names.push(name.clone());
                }
                Segment::Literal(_) => {}
            }

            segments.push(segment);
        }

        let specificity = segments.iter().map(Segment::weight).sum();
        Ok(Self { segments, specificity })
    }

    /// Precomputed specificity score: the sum of per-segment weights.
    pub fn specificity(&self) -> u32 {
        self.specificity
    }

    /// Matches a request path against this pattern.
    ///
    /// Trailing slashes are normalized away before comparison and literal
    /// segments are compared case-sensitively. On success the captured
    /// parameters are returned; a wildcard tail may bind the empty string
    /// when it matched zero segments.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = normalize(path).split('/').filter(|s| !s.is_empty()).collect();
        let mut params = PathParams::new();

        let mut cursor = 0usize;
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    if parts.get(cursor) != Some(&text.as_str()) {
                        return None;
                    }
                    cursor += 1;
                }
                Segment::Param(name) => {
                    let value = parts.get(cursor)?;
                    params.insert(name.clone(), (*value).to_string());
                    cursor += 1;
                }
                Segment::Wildcard(name) => {
                    debug_assert_eq!(idx, self.segments.len() - 1);
                    params.insert(name.clone(), parts[cursor..].join("/"));
                    cursor = parts.len();
                }
            }
        }

        if cursor == parts.len() {
            Some(params)
        } else {
            None
        }
    }
}

/// Strips trailing slashes so `/user/` and `/user` compare equal. The root
/// path stays `/`.
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str) -> CompiledPattern {
        CompiledPattern::compile(template).expect("template should compile")
    }

    #[test]
    fn literal_template_matches_exact_path_only() {
        let pattern = compile("/user/admin");
        assert!(pattern.match_path("/user/admin").is_some());
        assert!(pattern.match_path("/user/admin/").is_some());
        assert!(pattern.match_path("/user/Admin").is_none());
        assert!(pattern.match_path("/user").is_none());
        assert!(pattern.match_path("/user/admin/extra").is_none());
    }

    #[test]
    fn param_segment_captures_one_segment() {
        let pattern = compile("/user/:id");
        let params = pattern.match_path("/user/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(pattern.match_path("/user").is_none());
        assert!(pattern.match_path("/user/42/extra").is_none());
    }

    #[test]
    fn wildcard_tail_captures_remainder() {
        let pattern = compile("/files/:path*");
        let params = pattern.match_path("/files/a/b/c.txt").unwrap();
        assert_eq!(params.get("path").map(String::as_str), Some("a/b/c.txt"));
    }

    #[test]
    fn wildcard_tail_matches_zero_segments() {
        let pattern = compile("/files/:path*");
        let params = pattern.match_path("/files").unwrap();
        assert_eq!(params.get("path").map(String::as_str), Some(""));
    }

    #[test]
    fn bare_star_binds_under_star_name() {
        let pattern = compile("/static/*");
        let params = pattern.match_path("/static/css/site.css").unwrap();
        assert_eq!(params.get("*").map(String::as_str), Some("css/site.css"));
    }

    #[test]
    fn wildcard_must_be_last() {
        let err = CompiledPattern::compile("/files/:path*/meta").unwrap_err();
        assert!(matches!(err, CompileError::WildcardNotLast { .. }));
    }

    #[test]
    fn duplicate_parameter_names_rejected() {
        let err = CompiledPattern::compile("/pair/:id/:id").unwrap_err();
        assert!(matches!(err, CompileError::DuplicateParameter { .. }));

        let err = CompiledPattern::compile("/pair/:id/:id*").unwrap_err();
        assert!(matches!(err, CompileError::DuplicateParameter { .. }));
    }

    #[test]
    fn empty_parameter_name_rejected() {
        let err = CompiledPattern::compile("/user/:").unwrap_err();
        assert!(matches!(err, CompileError::EmptyParameter { .. }));
    }

    #[test]
    fn root_template_matches_root() {
        let pattern = compile("/");
        assert!(pattern.match_path("/").is_some());
        assert!(pattern.match_path("/anything").is_none());
    }

    #[test]
    fn specificity_ranks_literal_over_param_over_wildcard() {
        let literal = compile("/user/admin");
        let param = compile("/user/:id");
        let wildcard = compile("/user/:rest*");
        assert!(literal.specificity() > param.specificity());
        assert!(param.specificity() > wildcard.specificity());
    }

    #[test]
    fn random_templates_never_panic() {
        // Deterministic xorshift so the corpus is stable across runs.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let words = ["api", "v1", "users", "posts", "x", "files", "admin"];
        for _ in 0..500 {
            let len = (next() % 5) as usize + 1;
            let mut template = String::new();
            for i in 0..len {
                template.push('/');
                match next() % 3 {
                    0 => template.push_str(words[(next() % words.len() as u64) as usize]),
                    1 => {
                        template.push(':');
                        template.push_str(words[(next() % words.len() as u64) as usize]);
                    }
                    _ => {
                        if i == len - 1 {
                            template.push('*');
                        } else {
                            template.push_str(words[(next() % words.len() as u64) as usize]);
                        }
                    }
                }
            }

            let Ok(pattern) = CompiledPattern::compile(&template) else {
                continue;
            };
            let literal_only = !template.contains(':') && !template.contains('*');
            if literal_only {
                assert!(pattern.match_path(&template).is_some());
            }
            for _ in 0..20 {
                let plen = (next() % 6) as usize;
                let mut path = String::from("/");
                for _ in 0..plen {
                    path.push_str(words[(next() % words.len() as u64) as usize]);
                    path.push('/');
                }
                if pattern.match_path(&path).is_some() && literal_only {
                    // A literal-only template admits exactly its own path.
                    assert_eq!(path.trim_end_matches('/'), template);
                }
            }
        }
    }
}
