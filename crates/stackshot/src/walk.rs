use crate::frame::Frame;
use crate::trace::Trace;

impl<'s> Trace<'s> {
    /// Visits frames in capture order until `visitor` returns `false`.
    pub fn walk<F>(&self, mut visitor: F)
    where
        F: FnMut(&Frame, usize, &Trace<'s>) -> bool,
    {
        for (index, frame) in self.iter().enumerate() {
            if !visitor(frame, index, self) {
                break;
            }
        }
    }

    /// Like [`walk`](Self::walk), threading `context` through every call.
    pub fn walk_with<C, F>(&self, context: &mut C, mut visitor: F)
    where
        C: ?Sized,
        F: FnMut(&Frame, usize, &Trace<'s>, &mut C) -> bool,
    {
        for (index, frame) in self.iter().enumerate() {
            if !visitor(frame, index, self, context) {
                break;
            }
        }
    }
}
