//! Penn-Treebank style bracketed trees, as used by the SST release.
//!
//! `(3 (2 It) (4 (2 's) (3 good)))` is a node labelled `3` with two
//! children; `(2 It)` is a node labelled `2` whose only child is the leaf
//! word `It`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TreeError(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Leaf(String),
    Node(Tree),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub label: String,
    pub children: Vec<Child>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Atom(&'a str),
}

fn lex(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in input.char_indices() {
        if c == '(' || c == ')' || c.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(Token::Atom(&input[s..i]));
            }
            match c {
                '(' => tokens.push(Token::Open),
                ')' => tokens.push(Token::Close),
                _ => {}
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(Token::Atom(&input[s..]));
    }
    tokens
}

impl Tree {
    pub fn parse(input: &str) -> Result<Tree, TreeError> {
        let tokens = lex(input);
        let mut pos = 0;
        let tree = Self::parse_node(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(TreeError(format!(
                "unexpected trailing input after token {pos}"
            )));
        }
        Ok(tree)
    }

    fn parse_node(tokens: &[Token<'_>], pos: &mut usize) -> Result<Tree, TreeError> {
        match tokens.get(*pos) {
            Some(Token::Open) => *pos += 1,
            Some(other) => return Err(TreeError(format!("expected '(' but found {other:?}"))),
            None => return Err(TreeError("empty tree".to_string())),
        }

        let label = match tokens.get(*pos) {
            Some(Token::Atom(label)) => {
                *pos += 1;
                label.to_string()
            }
            _ => return Err(TreeError("node without a label".to_string())),
        };

        let mut children = Vec::new();
        loop {
            match tokens.get(*pos) {
                Some(Token::Close) => {
                    *pos += 1;
                    return Ok(Tree { label, children });
                }
                Some(Token::Atom(word)) => {
                    children.push(Child::Leaf(word.to_string()));
                    *pos += 1;
                }
                Some(Token::Open) => children.push(Child::Node(Self::parse_node(tokens, pos)?)),
                None => return Err(TreeError(format!("unbalanced parentheses in node {label:?}"))),
            }
        }
    }

    /// Words under this node, left to right.
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        for child in &self.children {
            match child {
                Child::Leaf(word) => out.push(word),
                Child::Node(node) => node.collect_leaves(out),
            }
        }
    }

    /// All nodes in pre-order, starting with `self`.
    pub fn subtrees(&self) -> Subtrees<'_> {
        Subtrees { stack: vec![self] }
    }
}

pub struct Subtrees<'a> {
    stack: Vec<&'a Tree>,
}

impl<'a> Iterator for Subtrees<'a> {
    type Item = &'a Tree;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            if let Child::Node(sub) = child {
                self.stack.push(sub);
            }
        }
        Some(node)
    }
}
