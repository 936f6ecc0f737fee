mod device;
mod kv;
mod timer;

pub use self::device::{
    Device, DeviceError, DeviceFeature, DeviceOperation, DeviceOutput, DeviceResult,
};
pub use self::kv::{
    KeyNamespace, KeyValue, KvError, KvKey, KvOperation, KvOutput, KvResult, MAX_VALUE_SIZE,
};
pub use self::timer::{Timer, TimerId, TimerOperation, TimerOutput};

pub use crux_core::render::Render;
pub use crux_http::Http;

// The Effect derive refers to the app and event types by name.
#[allow(unused_imports)]
use crate::app::App;
use crate::event::Event;

/// Effect variants are named after the capability types:
/// `Http`, `KeyValue`, `Device`, `Timer`, `Render`.
#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub kv: KeyValue<Event>,
    pub device: Device<Event>,
    pub timer: Timer<Event>,
    pub render: Render<Event>,
}
