use crate::program::OutlineItem;

/// Builds the outline tree from balanced open/close calls made during the
/// hoist walk.
#[derive(Debug, Default)]
pub(super) struct OutlineBuilder {
    roots: Vec<OutlineItem>,
    open: Vec<OutlineItem>,
}

impl OutlineBuilder {
    pub fn open(&mut self, item: OutlineItem) {
        self.open.push(item);
    }

    pub fn close(&mut self) {
        if let Some(item) = self.open.pop() {
            self.attach(item);
        }
    }

    pub fn leaf(&mut self, item: OutlineItem) {
        self.attach(item);
    }

    /// Level of the innermost open item, 0 at the top.
    pub fn depth(&self) -> usize {
        self.open.last().map_or(0, |item| item.level)
    }

    pub fn finish(mut self) -> Vec<OutlineItem> {
        while !self.open.is_empty() {
            self.close();
        }
        self.roots
    }

    fn attach(&mut self, item: OutlineItem) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(item),
            None => self.roots.push(item),
        }
    }
}
