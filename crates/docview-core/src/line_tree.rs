//! Line tree: the document's balanced tree of lines.
//!
//! Lines live in an arena and are addressed by [`LineId`], a generational handle that becomes
//! stale once the line is removed from the document. Tree nodes live in a second arena and refer
//! to each other by [`NodeId`] with parent back-indices, so computing a line's number is a walk
//! up the parent chain that sums the sizes of earlier siblings.
//!
//! Every node caches the number of lines and the total pixel height of its subtree. Leaves hold
//! at most [`LEAF_MAX`] lines and are cut into [`LEAF_CHUNK`]-line pieces when they grow past it;
//! branches hold at most [`BRANCH_MAX`] children and spill into new siblings beyond that; a
//! branch whose subtree drops below [`COLLAPSE_BELOW`] lines collapses into a single leaf.

use crate::error::{DocError, Result};
use crate::highlight::StyleRuns;
use crate::marks::MarkedSpan;
use crate::mode::ModeState;
use crate::text::char_len;
use tracing::trace;

/// Maximum number of lines in a leaf before it is split.
pub const LEAF_MAX: usize = 50;
/// Size of the pieces an oversized leaf is cut into.
pub const LEAF_CHUNK: usize = 25;
/// Maximum number of children of a branch before it spills.
pub const BRANCH_MAX: usize = 10;
/// Branches holding fewer lines than this collapse into one leaf.
pub const COLLAPSE_BELOW: usize = 25;

/// Stable, generational handle to a line.
///
/// A `LineId` keeps identifying the same line while edits elsewhere renumber it. Once the line
/// is removed from the tree the handle goes stale and lookups through it return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId {
    index: u32,
    generation: u32,
}

/// Handle to a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// One logical line of text.
#[derive(Debug, Clone)]
pub struct Line {
    text: String,
    char_len: usize,
    height: f64,
    parent: Option<NodeId>,
    /// Marked spans attached to this line.
    pub(crate) marked_spans: Vec<MarkedSpan>,
    /// Tokenizer state after this line, if known.
    pub(crate) state_after: Option<ModeState>,
    /// Cached style runs for rendering.
    pub(crate) style_runs: Option<StyleRuns>,
}

impl Line {
    /// Create a detached line.
    pub fn new(text: impl Into<String>, height: f64) -> Self {
        let text = text.into();
        Self {
            char_len: char_len(&text),
            text,
            height,
            parent: None,
            marked_spans: Vec::new(),
            state_after: None,
            style_runs: None,
        }
    }

    /// Line text (without a line separator).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Line length in characters.
    pub fn len(&self) -> usize {
        self.char_len
    }

    /// Whether the line has no text.
    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    /// Height in pixels.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Marked spans attached to the line.
    pub fn marked_spans(&self) -> &[MarkedSpan] {
        &self.marked_spans
    }

    /// Cached style runs, if the line has been highlighted.
    pub fn style_runs(&self) -> Option<&StyleRuns> {
        self.style_runs.as_ref()
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.char_len = char_len(&text);
        self.text = text;
        self.state_after = None;
        self.style_runs = None;
    }
}

#[derive(Debug)]
enum NodeKind {
    Leaf(Vec<LineId>),
    Branch(Vec<NodeId>),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    size: usize,
    height: f64,
    kind: NodeKind,
}

#[derive(Debug)]
struct LineSlot {
    generation: u32,
    line: Option<Line>,
}

/// Height-balanced tree of lines with cached size and height aggregates.
#[derive(Debug)]
pub struct LineTree {
    first: usize,
    root: NodeId,
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<u32>,
    lines: Vec<LineSlot>,
    free_lines: Vec<u32>,
}

impl LineTree {
    /// Build a tree holding `lines`, numbered from `first`.
    ///
    /// An empty `lines` vector is replaced by a single empty line: a document always has at
    /// least one line.
    pub fn new(mut lines: Vec<Line>, first: usize) -> Self {
        if lines.is_empty() {
            lines.push(Line::new("", 0.0));
        }
        let mut tree = Self {
            first,
            root: NodeId(0),
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            lines: Vec::new(),
            free_lines: Vec::new(),
        };
        let leaf = tree.alloc_node(None, NodeKind::Leaf(Vec::new()));
        tree.root = tree.alloc_node(None, NodeKind::Branch(vec![leaf]));
        tree.node_mut(leaf).parent = Some(tree.root);
        tree.insert(0, lines);
        tree
    }

    /// Number of the first line.
    pub fn first(&self) -> usize {
        self.first
    }

    /// Total number of lines.
    pub fn size(&self) -> usize {
        self.node(self.root).size
    }

    /// Number of the last line.
    pub fn last(&self) -> usize {
        self.first + self.size() - 1
    }

    /// Total height of all lines.
    pub fn height(&self) -> f64 {
        self.node(self.root).height
    }

    /// Whether `n` is a valid line number.
    pub fn is_line(&self, n: usize) -> bool {
        n >= self.first && n < self.first + self.size()
    }

    /// Access a line by handle. Returns `None` for stale handles.
    pub fn line(&self, id: LineId) -> Option<&Line> {
        let slot = self.lines.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.line.as_ref()
    }

    pub(crate) fn line_mut(&mut self, id: LineId) -> Option<&mut Line> {
        let slot = self.lines.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.line.as_mut()
    }

    /// Whether `id` still refers to a line in the tree.
    pub fn contains(&self, id: LineId) -> bool {
        self.line(id).is_some()
    }

    /// Find the line with number `n`.
    pub fn get_line(&self, n: usize) -> Result<LineId> {
        if !self.is_line(n) {
            return Err(DocError::OutOfRange {
                line: n,
                first: self.first,
                size: self.size(),
            });
        }
        let mut n = n - self.first;
        let mut node = self.root;
        loop {
            match &self.node(node).kind {
                NodeKind::Leaf(lines) => return Ok(lines[n]),
                NodeKind::Branch(children) => {
                    let mut next = None;
                    for &child in children {
                        let size = self.node(child).size;
                        if n < size {
                            next = Some(child);
                            break;
                        }
                        n -= size;
                    }
                    // Sizes are consistent, so a child always matches.
                    node = next.unwrap_or(*children.last().unwrap_or(&node));
                }
            }
        }
    }

    /// Line number of `id`, computed by walking up the parent links.
    pub fn line_number(&self, id: LineId) -> Option<usize> {
        let line = self.line(id)?;
        let mut cur = line.parent?;
        let NodeKind::Leaf(lines) = &self.node(cur).kind else {
            return None;
        };
        let mut no = lines.iter().position(|&l| l == id)?;
        while let Some(parent) = self.node(cur).parent {
            if let NodeKind::Branch(children) = &self.node(parent).kind {
                for &child in children {
                    if child == cur {
                        break;
                    }
                    no += self.node(child).size;
                }
            }
            cur = parent;
        }
        Some(no + self.first)
    }

    /// Number of the line covering vertical offset `h`.
    ///
    /// Offsets past the end of the document yield `first + size`.
    pub fn line_at_height(&self, mut h: f64) -> usize {
        let mut n = self.first;
        let mut node = self.root;
        'outer: loop {
            match &self.node(node).kind {
                NodeKind::Branch(children) => {
                    for &child in children {
                        let ch = self.node(child).height;
                        if h < ch {
                            node = child;
                            continue 'outer;
                        }
                        h -= ch;
                        n += self.node(child).size;
                    }
                    return n;
                }
                NodeKind::Leaf(lines) => {
                    let mut i = 0;
                    for &id in lines {
                        let lh = self.line(id).map(Line::height).unwrap_or(0.0);
                        if h < lh {
                            break;
                        }
                        h -= lh;
                        i += 1;
                    }
                    return n + i;
                }
            }
        }
    }

    /// Vertical offset of the top of line `id`.
    pub fn height_at_line(&self, id: LineId) -> f64 {
        let Some(mut cur) = self.line(id).and_then(|l| l.parent) else {
            return 0.0;
        };
        let mut h = 0.0;
        if let NodeKind::Leaf(lines) = &self.node(cur).kind {
            for &l in lines {
                if l == id {
                    break;
                }
                h += self.line(l).map(Line::height).unwrap_or(0.0);
            }
        }
        while let Some(parent) = self.node(cur).parent {
            if let NodeKind::Branch(children) = &self.node(parent).kind {
                for &child in children {
                    if child == cur {
                        break;
                    }
                    h += self.node(child).height;
                }
            }
            cur = parent;
        }
        h
    }

    /// Set the height of a line, updating every ancestor's aggregate.
    pub fn update_line_height(&mut self, id: LineId, height: f64) {
        let Some(line) = self.line_mut(id) else {
            return;
        };
        let diff = height - line.height;
        if diff == 0.0 {
            return;
        }
        line.height = height;
        let mut node = line.parent;
        while let Some(n) = node {
            let node_ref = self.node_mut(n);
            node_ref.height += diff;
            node = node_ref.parent;
        }
    }

    /// Handles of lines `[from, to)` (line numbers), in order.
    pub fn line_ids(&self, from: usize, to: usize) -> Vec<LineId> {
        let from = from.max(self.first);
        let to = to.min(self.first + self.size());
        let mut out = Vec::with_capacity(to.saturating_sub(from));
        if from < to {
            self.collect(self.root, from - self.first, to - from, &mut out);
        }
        out
    }

    fn collect(&self, node: NodeId, mut at: usize, mut n: usize, out: &mut Vec<LineId>) {
        match &self.node(node).kind {
            NodeKind::Leaf(lines) => out.extend_from_slice(&lines[at..at + n]),
            NodeKind::Branch(children) => {
                for &child in children {
                    let size = self.node(child).size;
                    if at < size {
                        let used = n.min(size - at);
                        self.collect(child, at, used, out);
                        n -= used;
                        if n == 0 {
                            break;
                        }
                        at = 0;
                    } else {
                        at -= size;
                    }
                }
            }
        }
    }

    /// Insert `lines` so the first of them gets number `at`.
    pub fn insert(&mut self, at: usize, lines: Vec<Line>) -> Vec<LineId> {
        let at = at.saturating_sub(self.first).min(self.size());
        let height: f64 = lines.iter().map(Line::height).sum();
        let ids: Vec<LineId> = lines.into_iter().map(|l| self.alloc_line(l)).collect();
        if !ids.is_empty() {
            self.insert_inner(self.root, at, &ids, height);
        }
        ids
    }

    /// Remove `n` lines starting at number `at`, returning them with their former handles.
    ///
    /// The returned lines are detached: their handles are stale from here on.
    pub fn remove(&mut self, at: usize, n: usize) -> Vec<(LineId, Line)> {
        let at = at.saturating_sub(self.first);
        let n = n.min(self.size().saturating_sub(at));
        if n == 0 {
            return Vec::new();
        }
        let mut removed = Vec::with_capacity(n);
        self.remove_inner(self.root, at, n, &mut removed);
        removed
            .into_iter()
            .filter_map(|id| self.free_line(id).map(|line| (id, line)))
            .collect()
    }

    fn insert_inner(&mut self, node: NodeId, at: usize, ids: &[LineId], height: f64) {
        {
            let n = self.node_mut(node);
            n.size += ids.len();
            n.height += height;
        }
        let children = match &mut self.node_mut(node).kind {
            NodeKind::Leaf(lines) => {
                lines.splice(at..at, ids.iter().copied());
                for &id in ids {
                    if let Some(line) = self.line_mut(id) {
                        line.parent = Some(node);
                    }
                }
                return;
            }
            NodeKind::Branch(children) => children.clone(),
        };

        let mut at = at;
        for (i, &child) in children.iter().enumerate() {
            let size = self.node(child).size;
            if at <= size {
                self.insert_inner(child, at, ids, height);
                let oversized = matches!(&self.node(child).kind, NodeKind::Leaf(l) if l.len() > LEAF_MAX);
                if oversized {
                    self.split_leaf(node, i, child);
                    self.maybe_spill(node);
                }
                break;
            }
            at -= size;
        }
    }

    fn split_leaf(&mut self, parent: NodeId, index: usize, leaf: NodeId) {
        let NodeKind::Leaf(lines) = &mut self.node_mut(leaf).kind else {
            return;
        };
        let remaining = lines.len() % LEAF_CHUNK + LEAF_CHUNK;
        let tail: Vec<LineId> = lines.split_off(remaining);
        trace!(lines = remaining + tail.len(), "splitting leaf");

        let mut insert_at = index + 1;
        for chunk in tail.chunks(LEAF_CHUNK) {
            let h: f64 = chunk
                .iter()
                .map(|&id| self.line(id).map(Line::height).unwrap_or(0.0))
                .sum();
            let new_leaf = self.alloc_node(Some(parent), NodeKind::Leaf(chunk.to_vec()));
            {
                let n = self.node_mut(new_leaf);
                n.size = chunk.len();
                n.height = h;
            }
            for &id in chunk {
                if let Some(line) = self.line_mut(id) {
                    line.parent = Some(new_leaf);
                }
            }
            {
                let old = self.node_mut(leaf);
                old.size -= chunk.len();
                old.height -= h;
            }
            if let NodeKind::Branch(children) = &mut self.node_mut(parent).kind {
                children.insert(insert_at, new_leaf);
            }
            insert_at += 1;
        }
    }

    fn maybe_spill(&mut self, node: NodeId) {
        if self.child_count(node) <= BRANCH_MAX {
            return;
        }
        let mut me = node;
        loop {
            let spilled: Vec<NodeId> = match &mut self.node_mut(me).kind {
                NodeKind::Branch(children) => {
                    let at = children.len() - 5;
                    children.split_off(at)
                }
                NodeKind::Leaf(_) => return,
            };
            let sibling = self.alloc_branch(spilled);
            match self.node(me).parent {
                None => {
                    // The root stays put; its children move into a fresh branch.
                    let children = match &mut self.node_mut(me).kind {
                        NodeKind::Branch(children) => std::mem::take(children),
                        NodeKind::Leaf(_) => Vec::new(),
                    };
                    let copy = self.alloc_branch(children);
                    self.node_mut(copy).parent = Some(me);
                    self.node_mut(sibling).parent = Some(me);
                    if let NodeKind::Branch(children) = &mut self.node_mut(me).kind {
                        *children = vec![copy, sibling];
                    }
                    me = copy;
                }
                Some(parent) => {
                    let (size, height) = {
                        let s = self.node(sibling);
                        (s.size, s.height)
                    };
                    {
                        let m = self.node_mut(me);
                        m.size -= size;
                        m.height -= height;
                    }
                    self.node_mut(sibling).parent = Some(parent);
                    if let NodeKind::Branch(children) = &mut self.node_mut(parent).kind {
                        let idx = children.iter().position(|&c| c == me).unwrap_or(0);
                        children.insert(idx + 1, sibling);
                    }
                }
            }
            if self.child_count(me) <= BRANCH_MAX {
                break;
            }
        }
        trace!("branch spilled");
        if let Some(parent) = self.node(me).parent {
            self.maybe_spill(parent);
        }
    }

    fn remove_inner(&mut self, node: NodeId, at: usize, n: usize, out: &mut Vec<LineId>) {
        let children = match &mut self.node_mut(node).kind {
            NodeKind::Leaf(lines) => {
                let removed: Vec<LineId> = lines.drain(at..at + n).collect();
                let h: f64 = removed
                    .iter()
                    .map(|&id| self.line(id).map(Line::height).unwrap_or(0.0))
                    .sum();
                let node_ref = self.node_mut(node);
                node_ref.size -= n;
                node_ref.height -= h;
                out.extend(removed);
                return;
            }
            NodeKind::Branch(children) => children.clone(),
        };
        self.node_mut(node).size -= n;

        let mut at = at;
        let mut n = n;
        for child in children {
            let size = self.node(child).size;
            if at < size {
                let rm = n.min(size - at);
                let old_height = self.node(child).height;
                self.remove_inner(child, at, rm, out);
                let new_height = self.node(child).height;
                self.node_mut(node).height -= old_height - new_height;
                if size == rm {
                    if let NodeKind::Branch(children) = &mut self.node_mut(node).kind {
                        children.retain(|&c| c != child);
                    }
                    self.free_subtree(child);
                }
                n -= rm;
                if n == 0 {
                    break;
                }
                at = 0;
            } else {
                at -= size;
            }
        }

        let needs_collapse = {
            let me = self.node(node);
            match &me.kind {
                NodeKind::Branch(children) => {
                    me.size < COLLAPSE_BELOW
                        && (children.len() > 1
                            || children
                                .first()
                                .is_some_and(|&c| !matches!(self.node(c).kind, NodeKind::Leaf(_))))
                }
                NodeKind::Leaf(_) => false,
            }
        };
        if needs_collapse {
            self.collapse(node);
        }
    }

    fn collapse(&mut self, node: NodeId) {
        let mut lines = Vec::with_capacity(self.node(node).size);
        self.gather_lines(node, &mut lines);
        let old_children = match &mut self.node_mut(node).kind {
            NodeKind::Branch(children) => std::mem::take(children),
            NodeKind::Leaf(_) => return,
        };
        for child in old_children {
            self.free_subtree(child);
        }
        let height = self.node(node).height;
        let leaf = self.alloc_node(Some(node), NodeKind::Leaf(Vec::new()));
        for &id in &lines {
            if let Some(line) = self.line_mut(id) {
                line.parent = Some(leaf);
            }
        }
        {
            let l = self.node_mut(leaf);
            l.size = lines.len();
            l.height = height;
            l.kind = NodeKind::Leaf(lines);
        }
        if let NodeKind::Branch(children) = &mut self.node_mut(node).kind {
            children.push(leaf);
        }
        trace!("collapsed branch into a single leaf");
    }

    fn gather_lines(&self, node: NodeId, out: &mut Vec<LineId>) {
        match &self.node(node).kind {
            NodeKind::Leaf(lines) => out.extend_from_slice(lines),
            NodeKind::Branch(children) => {
                for &child in children {
                    self.gather_lines(child, out);
                }
            }
        }
    }

    fn child_count(&self, node: NodeId) -> usize {
        match &self.node(node).kind {
            NodeKind::Branch(children) => children.len(),
            NodeKind::Leaf(_) => 0,
        }
    }

    fn alloc_branch(&mut self, children: Vec<NodeId>) -> NodeId {
        let (size, height) = children.iter().fold((0, 0.0), |(s, h), &c| {
            let n = self.node(c);
            (s + n.size, h + n.height)
        });
        let id = self.alloc_node(None, NodeKind::Branch(children.clone()));
        {
            let n = self.node_mut(id);
            n.size = size;
            n.height = height;
        }
        for child in children {
            self.node_mut(child).parent = Some(id);
        }
        id
    }

    fn alloc_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let node = Node {
            parent,
            size: 0,
            height: 0.0,
            kind,
        };
        if let Some(idx) = self.free_nodes.pop() {
            self.nodes[idx as usize] = Some(node);
            NodeId(idx)
        } else {
            self.nodes.push(Some(node));
            NodeId((self.nodes.len() - 1) as u32)
        }
    }

    fn free_subtree(&mut self, node: NodeId) {
        if let Some(n) = self.nodes[node.0 as usize].take() {
            if let NodeKind::Branch(children) = n.kind {
                for child in children {
                    self.free_subtree(child);
                }
            }
            self.free_nodes.push(node.0);
        }
    }

    fn alloc_line(&mut self, line: Line) -> LineId {
        if let Some(index) = self.free_lines.pop() {
            let slot = &mut self.lines[index as usize];
            slot.line = Some(line);
            LineId {
                index,
                generation: slot.generation,
            }
        } else {
            self.lines.push(LineSlot {
                generation: 0,
                line: Some(line),
            });
            LineId {
                index: (self.lines.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn free_line(&mut self, id: LineId) -> Option<Line> {
        let slot = self.lines.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let mut line = slot.line.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_lines.push(id.index);
        line.parent = None;
        Some(line)
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.0 as usize]
            .as_ref()
            .expect("node ids held by the tree are live")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.0 as usize]
            .as_mut()
            .expect("node ids held by the tree are live")
    }

    /// Check the shape and aggregate invariants of the whole tree.
    ///
    /// Returns a description of the first violation found.
    pub fn verify(&self) -> std::result::Result<(), String> {
        let (size, _) = self.verify_node(self.root, None)?;
        if size != self.size() {
            return Err(format!("root size {} != counted {}", self.size(), size));
        }
        Ok(())
    }

    fn verify_node(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> std::result::Result<(usize, f64), String> {
        let node = self.node(id);
        if node.parent != parent {
            return Err(format!("node {:?} has a wrong parent link", id));
        }
        let (size, height) = match &node.kind {
            NodeKind::Leaf(lines) => {
                if lines.len() > LEAF_MAX {
                    return Err(format!("leaf {:?} holds {} lines", id, lines.len()));
                }
                let mut h = 0.0;
                for &l in lines {
                    let line = self.line(l).ok_or_else(|| format!("stale line in {:?}", id))?;
                    if line.parent != Some(id) {
                        return Err(format!("line {:?} has a wrong parent link", l));
                    }
                    h += line.height;
                }
                (lines.len(), h)
            }
            NodeKind::Branch(children) => {
                if children.len() > BRANCH_MAX {
                    return Err(format!("branch {:?} has {} children", id, children.len()));
                }
                let mut s = 0;
                let mut h = 0.0;
                for &child in children {
                    let (cs, ch) = self.verify_node(child, Some(id))?;
                    s += cs;
                    h += ch;
                }
                (s, h)
            }
        };
        if size != node.size {
            return Err(format!("node {:?} size {} != {}", id, node.size, size));
        }
        if (height - node.height).abs() > 1e-6 * height.abs().max(1.0) {
            return Err(format!("node {:?} height {} != {}", id, node.height, height));
        }
        Ok((size, height))
    }
}
