/// Shell-style wildcard matching.
///
/// `*` matches within one path segment, `**` across segments, `?` one
/// character and `[...]` a character class (`[!...]` negates, `a-z` ranges).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    Matcher::new(&p, &t).matches(0, 0)
}

/// Patterns without a `/` are matched against the file name only.
pub fn matches_entry(pattern: &str, file_name: &str, relative_path: &str) -> bool {
    if pattern.contains('/') {
        glob_match(pattern, relative_path)
    } else {
        glob_match(pattern, file_name)
    }
}

/// Memoized on `(pattern index, text index)`, so each pair is decided once
/// and wildcard-heavy patterns stay polynomial.
struct Matcher<'a> {
    p: &'a [char],
    t: &'a [char],
    memo: Vec<Option<bool>>,
}

impl<'a> Matcher<'a> {
    fn new(p: &'a [char], t: &'a [char]) -> Self {
        Self {
            p,
            t,
            memo: vec![None; (p.len() + 1) * (t.len() + 1)],
        }
    }

    fn matches(&mut self, pi: usize, ti: usize) -> bool {
        let slot = pi * (self.t.len() + 1) + ti;
        if let Some(known) = self.memo[slot] {
            return known;
        }
        let result = self.step(pi, ti);
        self.memo[slot] = Some(result);
        result
    }

    fn step(&mut self, pi: usize, ti: usize) -> bool {
        let (p, t) = (self.p, self.t);
        match p.get(pi) {
            None => ti == t.len(),
            Some('*') if p.get(pi + 1) == Some(&'*') => {
                let after = pi + 2;
                let rest = if p.get(after) == Some(&'/') { after + 1 } else { after };
                (ti..=t.len()).any(|i| self.matches(rest, i) || self.matches(after, i))
            }
            Some('*') => {
                for i in ti..=t.len() {
                    if self.matches(pi + 1, i) {
                        return true;
                    }
                    if i < t.len() && t[i] == '/' {
                        break;
                    }
                }
                false
            }
            Some('?') => ti < t.len() && t[ti] != '/' && self.matches(pi + 1, ti + 1),
            Some('[') => match (t.get(ti), parse_class(&p[pi + 1..])) {
                (Some(c), Some((class, consumed))) => {
                    *c != '/' && class.matches(*c) && self.matches(pi + 1 + consumed, ti + 1)
                }
                // Unterminated class: treat `[` literally.
                (Some(c), None) => *c == '[' && self.matches(pi + 1, ti + 1),
                (None, _) => false,
            },
            Some(lit) => t.get(ti) == Some(lit) && self.matches(pi + 1, ti + 1),
        }
    }
}

struct CharClass {
    negated: bool,
    items: Vec<(char, char)>,
}

impl CharClass {
    fn matches(&self, c: char) -> bool {
        let hit = self.items.iter().any(|(lo, hi)| *lo <= c && c <= *hi);
        hit != self.negated
    }
}

/// Parse the body after `[`. Returns the class and how many chars it used,
/// including the closing `]`.
fn parse_class(p: &[char]) -> Option<(CharClass, usize)> {
    let mut i = 0;
    let negated = matches!(p.first(), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut items = Vec::new();
    let mut first = true;
    while i < p.len() {
        let c = p[i];
        if c == ']' && !first {
            return Some((CharClass { negated, items }, i + 1));
        }
        first = false;
        if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            items.push((c, p[i + 2]));
            i += 3;
        } else {
            items.push((c, c));
            i += 1;
        }
    }
    None
}
