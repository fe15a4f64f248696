//! Driver event bus
//!
//! Four events cross the library boundary: `initialized` after the init
//! sequence, `ringalert` when the gateway announces pending traffic,
//! `newmessage` when an MT payload has been read and verified, and `debug`
//! for trace mirroring. Handlers run synchronously on the driver's thread in
//! registration order; events never carry errors.

type VoidHandler = Box<dyn FnMut() + Send>;
type MessageHandler = Box<dyn FnMut(&[u8], u32) + Send>;
type DebugHandler = Box<dyn FnMut(&str) + Send>;

/// Multi-listener subscription registry
pub struct EventBus {
    initialized: Vec<VoidHandler>,
    ring_alert: Vec<VoidHandler>,
    new_message: Vec<MessageHandler>,
    debug: Vec<DebugHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            initialized: Vec::new(),
            ring_alert: Vec::new(),
            new_message: Vec::new(),
            debug: Vec::new(),
        }
    }

    pub fn on_initialized(&mut self, handler: impl FnMut() + Send + 'static) {
        self.initialized.push(Box::new(handler));
    }

    pub fn on_ring_alert(&mut self, handler: impl FnMut() + Send + 'static) {
        self.ring_alert.push(Box::new(handler));
    }

    /// Handler receives the MT payload and the gateway's remaining queue depth
    pub fn on_new_message(&mut self, handler: impl FnMut(&[u8], u32) + Send + 'static) {
        self.new_message.push(Box::new(handler));
    }

    pub fn on_debug(&mut self, handler: impl FnMut(&str) + Send + 'static) {
        self.debug.push(Box::new(handler));
    }

    pub fn emit_initialized(&mut self) {
        for handler in self.initialized.iter_mut() {
            handler();
        }
    }

    pub fn emit_ring_alert(&mut self) {
        for handler in self.ring_alert.iter_mut() {
            handler();
        }
    }

    pub fn emit_new_message(&mut self, payload: &[u8], queued: u32) {
        for handler in self.new_message.iter_mut() {
            handler(payload, queued);
        }
    }

    pub fn emit_debug(&mut self, message: &str) {
        for handler in self.debug.iter_mut() {
            handler(message);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
