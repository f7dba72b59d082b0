//! Port enumeration against whatever hardware the host has

use tinygkit_communication::communication::serial::list_ports;

#[test]
fn test_listed_ports_are_controller_candidates() {
    match list_ports() {
        Ok(ports) => {
            for port in ports {
                let name = port.port_name.as_str();
                assert!(
                    name.starts_with("COM")
                        || name.starts_with("/dev/ttyUSB")
                        || name.starts_with("/dev/ttyACM")
                        || name.starts_with("/dev/cu.usb"),
                    "unexpected port {}",
                    name
                );
            }
        }
        // no enumeration backend in some sandboxes
        Err(e) => eprintln!("Port enumeration unavailable: {}", e),
    }
}
