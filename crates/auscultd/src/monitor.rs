//! Read-only status display
//!
//! `--monitor` prints the palpation sensor state, listening position and
//! manual-breath flag every half second without touching any hardware.
//! `--test` adds a device probe per refresh: firmware version, system
//! info and a tracks-playing count, which is enough to verify the serial
//! path end to end.

use std::time::Duration;

use auscult_core::PhysioStore;
use auscult_io::TriggerBackend;

const REFRESH: Duration = Duration::from_millis(500);

/// Run the status display until the process is signalled. Never returns.
pub fn run_monitor(store: &PhysioStore, mut trigger: Option<Box<dyn TriggerBackend>>) -> ! {
    if let Some(t) = trigger.as_mut() {
        match t.version() {
            Ok(v) => println!("trigger version: {}", v),
            Err(e) => println!("trigger version unavailable: {}", e),
        }
        match t.sys_info() {
            Ok(info) => println!(
                "trigger: {} voices, {} tracks, {}",
                info.voices,
                info.tracks,
                if info.mono { "mono" } else { "STEREO (must be mono)" }
            ),
            Err(e) => println!("trigger sys info unavailable: {}", e),
        }
    }

    loop {
        let pulse = store.pulse();
        let auscultation = store.auscultation();
        let respiration = store.respiration();

        let mut line = String::from("sense");
        for i in 0..4 {
            line.push_str(&format!(
                " {}:{}:{:?}:{}",
                pulse.base[i], pulse.ain[i], pulse.touch[i], pulse.volume[i]
            ));
        }
        line.push_str(&format!(
            "  Tag: '{}'{}",
            auscultation.tag,
            if respiration.manual_breath { " - Breath" } else { "" }
        ));
        println!("{}", line);

        if let Some(t) = trigger.as_mut() {
            match t.tracks_playing() {
                Ok(n) => println!("tracks playing: {}", n),
                Err(e) => println!("tracks playing unavailable: {}", e),
            }
        }

        std::thread::sleep(REFRESH);
    }
}
