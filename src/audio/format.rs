//! PipeWire stream format helpers shared by capture and playback

use log::warn;
use pipewire as pw;
use pw::spa;
use pw::spa::param::audio::AudioInfoRaw;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::time::Duration;

/// How long `start` waits for a stream to reach the streaming state
pub const STREAM_READY_TIMEOUT: Duration = Duration::from_secs(3);

/// Serialize an `EnumFormat` pod requesting F32LE at `rate` with `channels`
pub fn f32_format_pod(rate: u32, channels: u32) -> Result<Vec<u8>, String> {
    let mut audio_info = AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(rate);
    audio_info.set_channels(channels);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    Ok(values)
}

/// Track the format negotiated for a stream from its `param_changed` events
pub fn update_format(format: &mut AudioInfoRaw, id: u32, param: Option<&Pod>) {
    let Some(param) = param else { return };
    if id != spa::param::ParamType::Format.as_raw() {
        return;
    }

    let (media_type, media_subtype) = match format_utils::parse_format(param) {
        Ok(v) => v,
        Err(_) => return,
    };

    if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
        return;
    }

    if let Err(e) = format.parse(param) {
        warn!("Failed to parse negotiated audio format: {:?}", e);
    }
}
