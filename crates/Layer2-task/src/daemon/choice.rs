//! Interactive choice detection
//!
//! Pure classification over freshly observed, control-sequence-stripped
//! output. Matchers run in a fixed order and the first match wins. Detection
//! is heuristic by design: the external tools have no structured protocol,
//! so false positives and negatives are accepted, bounded by the polling
//! loop's overall timeout.

use crate::agent::AgentKind;
use regex::Regex;

/// A detected interactive prompt that blocks further output until answered.
///
/// Ephemeral: consumed immediately by the resolution step, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Acceptable response tokens, in order ("y", "n", "1", "enter", ...)
    pub options: Vec<String>,

    /// Human-readable description of what is being asked
    pub description: String,
}

/// One pattern strategy in the ordered matcher list.
///
/// New interactive-prompt shapes are added by appending a matcher, without
/// touching the polling loop.
pub trait ChoiceMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn find(&self, text: &str) -> Option<Choice>;
}

/// Yes/no prompt at or near the end of the text: `(y/n)`, `[Y/N]`, `yes/no`
struct YesNoMatcher {
    re: Regex,
}

impl YesNoMatcher {
    fn new() -> Self {
        Self {
            re: Regex::new(r"(?i)[(\[]\s*y(?:es)?\s*/\s*n(?:o)?\s*[)\]]|yes/no").unwrap(),
        }
    }
}

impl ChoiceMatcher for YesNoMatcher {
    fn name(&self) -> &'static str {
        "yes-no"
    }

    fn find(&self, text: &str) -> Option<Choice> {
        // Only the trailing lines count: once the tool moves on, an old
        // question further up must not re-trigger.
        let tail = tail_lines(text, 2);
        if self.re.is_match(&tail) {
            let line = tail
                .lines()
                .rev()
                .find(|l| self.re.is_match(l))
                .unwrap_or(&tail)
                .trim()
                .to_string();
            Some(Choice {
                options: vec!["y".to_string(), "n".to_string()],
                description: line,
            })
        } else {
            None
        }
    }
}

/// Claude-style permission prompts: allow/deny/permit phrasing plus a
/// question mark. Registered for the heavier agent only.
struct PermissionMatcher {
    re: Regex,
}

impl PermissionMatcher {
    fn new() -> Self {
        Self {
            re: Regex::new(r"(?i)\b(allow|deny|permit)\b").unwrap(),
        }
    }
}

impl ChoiceMatcher for PermissionMatcher {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn find(&self, text: &str) -> Option<Choice> {
        if !text.contains('?') {
            return None;
        }
        let line = text.lines().rev().find(|l| self.re.is_match(l))?;
        Some(Choice {
            options: vec!["y".to_string(), "n".to_string()],
            description: line.trim().to_string(),
        })
    }
}

/// Two or more numbered-list lines: optional bracket, digit, separator, text
struct NumberedListMatcher {
    line_re: Regex,
}

impl NumberedListMatcher {
    fn new() -> Self {
        Self {
            line_re: Regex::new(r"^\s*\[?\d+[)\].:]\s*\S").unwrap(),
        }
    }
}

impl ChoiceMatcher for NumberedListMatcher {
    fn name(&self) -> &'static str {
        "numbered-list"
    }

    fn find(&self, text: &str) -> Option<Choice> {
        // Lists scroll out of the window like any other prompt: only count
        // lines still near the end
        let tail = tail_lines(text, 6);
        let count = tail.lines().filter(|l| self.line_re.is_match(l)).count();
        if count >= 2 {
            Some(Choice {
                options: (1..=count).map(|i| i.to_string()).collect(),
                description: format!("select an option (1-{count})"),
            })
        } else {
            None
        }
    }
}

/// "Press enter to continue" style prompts
struct ContinueMatcher {
    re: Regex,
}

impl ContinueMatcher {
    fn new() -> Self {
        Self {
            re: Regex::new(r"(?i)press\s+enter|hit\s+enter|continue\?").unwrap(),
        }
    }
}

impl ChoiceMatcher for ContinueMatcher {
    fn name(&self) -> &'static str {
        "continue"
    }

    fn find(&self, text: &str) -> Option<Choice> {
        let tail = tail_lines(text, 2);
        if self.re.is_match(&tail) {
            Some(Choice {
                options: vec!["enter".to_string()],
                description: "press enter to continue".to_string(),
            })
        } else {
            None
        }
    }
}

/// Last `n` non-empty lines of `text`, joined with newlines
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Ordered list of pattern matchers; first match wins.
pub struct ChoiceDetector {
    matchers: Vec<Box<dyn ChoiceMatcher>>,
}

impl ChoiceDetector {
    /// Build the matcher list for an agent kind.
    ///
    /// Permission phrasing is only meaningful for the heavier agent; the
    /// lighter one auto-approves in one-shot mode and never prints it.
    pub fn for_agent(agent: AgentKind) -> Self {
        let mut matchers: Vec<Box<dyn ChoiceMatcher>> = vec![Box::new(YesNoMatcher::new())];
        if agent == AgentKind::Claude {
            matchers.push(Box::new(PermissionMatcher::new()));
        }
        matchers.push(Box::new(NumberedListMatcher::new()));
        matchers.push(Box::new(ContinueMatcher::new()));
        Self { matchers }
    }

    /// Classify a text fragment; `None` means no interactive choice detected
    pub fn detect(&self, text: &str) -> Option<Choice> {
        if text.trim().is_empty() {
            return None;
        }
        self.matchers.iter().find_map(|m| m.find(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claude() -> ChoiceDetector {
        ChoiceDetector::for_agent(AgentKind::Claude)
    }

    fn gemini() -> ChoiceDetector {
        ChoiceDetector::for_agent(AgentKind::Gemini)
    }

    #[test]
    fn test_yes_no_parenthesized() {
        let choice = claude().detect("Proceed? (y/n)").unwrap();
        assert_eq!(choice.options, vec!["y", "n"]);
    }

    #[test]
    fn test_yes_no_variants() {
        for text in [
            "Continue [Y/N]",
            "overwrite file? (yes/no)",
            "Apply changes? yes/no",
        ] {
            let choice = claude().detect(text).unwrap_or_else(|| panic!("{text}"));
            assert_eq!(choice.options, vec!["y", "n"]);
        }
    }

    #[test]
    fn test_old_yes_no_not_near_end_is_ignored() {
        let text = "Proceed? (y/n)\nworking...\nstill working...\ndone";
        assert!(claude().detect(text).is_none());
    }

    #[test]
    fn test_permission_phrasing_claude_only() {
        let text = "Relay wants to run `rm -rf target`.\nAllow this command?";
        let choice = claude().detect(text).unwrap();
        assert_eq!(choice.options, vec!["y", "n"]);
        assert!(choice.description.contains("Allow"));

        assert!(gemini().detect(text).is_none());
    }

    #[test]
    fn test_permission_requires_question_mark() {
        assert!(claude().detect("permission granted, allow list updated").is_none());
    }

    #[test]
    fn test_numbered_list() {
        let choice = claude().detect("1) a\n2) b\n3) c").unwrap();
        assert_eq!(choice.options, vec!["1", "2", "3"]);
        assert_eq!(choice.description, "select an option (1-3)");
    }

    #[test]
    fn test_numbered_list_shapes() {
        let choice = claude().detect("[1] first\n[2] second").unwrap();
        assert_eq!(choice.options, vec!["1", "2"]);

        let choice = claude().detect("  1. first\n  2. second").unwrap();
        assert_eq!(choice.options, vec!["1", "2"]);
    }

    #[test]
    fn test_single_numbered_line_is_not_a_list() {
        assert!(claude().detect("1) only one item").is_none());
    }

    #[test]
    fn test_scrolled_off_list_is_ignored() {
        let text = "1) red\n2) blue\nselection accepted\nrendering\npalette loaded\nok\ndone";
        assert!(claude().detect(text).is_none());
    }

    #[test]
    fn test_continue_prompt() {
        let choice = claude().detect("Press Enter to continue...").unwrap();
        assert_eq!(choice.options, vec!["enter"]);

        let choice = gemini().detect("Loaded. Continue?").unwrap();
        assert_eq!(choice.options, vec!["enter"]);
    }

    #[test]
    fn test_unrelated_prose_is_no_choice() {
        let text = "The function computes a checksum over the input buffer\nand returns it as hex.";
        assert!(claude().detect(text).is_none());
        assert!(gemini().detect(text).is_none());
    }

    #[test]
    fn test_detection_is_pure() {
        let detector = claude();
        let text = "Proceed? (y/n)";
        let first = detector.detect(text);
        for _ in 0..10 {
            assert_eq!(detector.detect(text), first);
        }
    }

    #[test]
    fn test_yes_no_wins_over_numbered_list() {
        // Ordered matching: a trailing y/n question beats list lines above it
        let text = "1) alpha\n2) beta\nUse defaults? (y/n)";
        let choice = claude().detect(text).unwrap();
        assert_eq!(choice.options, vec!["y", "n"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(claude().detect("").is_none());
        assert!(claude().detect("  \n  ").is_none());
    }
}
