/// A single search term as written by the user, before ngram expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Word(String),
    /// A quoted phrase. Expanded to an AND of its constituent ngrams — there
    /// is no positional verification at the index layer (spec §4.3).
    Phrase(String),
}

impl Term {
    pub fn text(&self) -> &str {
        match self {
            Term::Word(s) | Term::Phrase(s) => s,
        }
    }
}

/// Boolean expression over search terms. AND/NOT are left-associative and
/// binary (`A NOT B` = `A ∧ ¬B`), never a unary prefix (spec §4.5), so the
/// tree is built by folding terms left to right rather than by precedence
/// climbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BooleanExpr {
    Leaf(Term),
    And(Box<BooleanExpr>, Box<BooleanExpr>),
    AndNot(Box<BooleanExpr>, Box<BooleanExpr>),
}

impl BooleanExpr {
    pub fn leaf(term: Term) -> Self {
        BooleanExpr::Leaf(term)
    }

    pub fn and(self, rhs: BooleanExpr) -> Self {
        BooleanExpr::And(Box::new(self), Box::new(rhs))
    }

    pub fn and_not(self, rhs: BooleanExpr) -> Self {
        BooleanExpr::AndNot(Box::new(self), Box::new(rhs))
    }

    /// Collects every leaf term in left-to-right order, used by the executor
    /// to count terms/ngrams for the DEBUG block.
    pub fn leaves(&self) -> Vec<&Term> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Term>) {
        match self {
            BooleanExpr::Leaf(t) => out.push(t),
            BooleanExpr::And(l, r) | BooleanExpr::AndNot(l, r) => {
                l.collect_leaves(out);
                r.collect_leaves(out);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_left_associative_tree() {
        // "machine AND learning NOT advanced" folds as
        // AndNot(And(machine, learning), advanced)
        let expr = BooleanExpr::leaf(Term::Word("machine".into()))
            .and(BooleanExpr::leaf(Term::Word("learning".into())))
            .and_not(BooleanExpr::leaf(Term::Word("advanced".into())));
        match expr {
            BooleanExpr::AndNot(lhs, rhs) => {
                assert_eq!(*rhs, BooleanExpr::Leaf(Term::Word("advanced".into())));
                match *lhs {
                    BooleanExpr::And(_, _) => {}
                    _ => panic!("expected nested And"),
                }
            }
            _ => panic!("expected AndNot at root"),
        }
    }

    #[test]
    fn leaves_collect_in_order() {
        let expr = BooleanExpr::leaf(Term::Word("a".into()))
            .and(BooleanExpr::leaf(Term::Word("b".into())))
            .and_not(BooleanExpr::leaf(Term::Word("c".into())));
        let words: Vec<&str> = expr.leaves().into_iter().map(|t| t.text()).collect();
        assert_eq!(words, vec!["a", "b", "c"]);
    }
}
