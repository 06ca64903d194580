use crate::event::{Event, Site};
use crate::line::Prefix;

/// Something the tracing engine calls once per traced event.
///
/// `handle` runs inline on the traced program's own thread and must not
/// panic or block on anything but the output sink.
pub trait Action: Send + Sync {
    fn handle(&self, event: &Event);

    /// Push buffered output to the underlying stream.
    fn flush(&self) {}
}

impl<A: Action + ?Sized> Action for Box<A> {
    fn handle(&self, event: &Event) {
        (**self).handle(event)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

impl<A: Action + ?Sized> Action for std::sync::Arc<A> {
    fn handle(&self, event: &Event) {
        (**self).handle(event)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

pub(crate) fn prefix_for(site: &Site, pid: bool) -> Prefix {
    Prefix {
        pid: if pid { Some(std::process::id()) } else { None },
        thread: site.thread_name.clone(),
        location: site.location(),
    }
}
