//! USB CDC console device.
//!
//! The bell exposes a single CDC ACM port for the operator console. Descriptor
//! buffers and class state live in one static [`UsbBuffers`] block handed over
//! at boot.

use embassy_usb::class::cdc_acm::{CdcAcmClass, ControlChanged, Receiver, Sender, State};
use embassy_usb::driver::Driver;
use embassy_usb::{Builder, Config, UsbDevice};

/// Full-speed bulk packet size.
pub const MAX_PACKET_SIZE: u16 = 64;

/// pid.codes test VID shared by open hardware projects.
const VENDOR_ID: u16 = 0x1209;
const PRODUCT_ID: u16 = 0x0001;
/// Bus power requested in milliamps.
const MAX_POWER_MA: u16 = 100;

const CONTROL_LEN: usize = 64;
const DESCRIPTOR_LEN: usize = 256;

/// Strings advertised in the device descriptor.
#[derive(Clone, Copy, Debug)]
pub struct DeviceIdentity {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl DeviceIdentity {
    pub const BELL: Self = Self {
        manufacturer: "Bell Controller",
        product: "Weekly Bell Console",
        serial_number: None,
    };
}

/// Static storage borrowed by the builder for the life of the device.
pub struct UsbBuffers {
    control: [u8; CONTROL_LEN],
    config_descriptor: [u8; DESCRIPTOR_LEN],
    bos_descriptor: [u8; DESCRIPTOR_LEN],
    msos_descriptor: [u8; DESCRIPTOR_LEN],
    cdc_state: State<'static>,
}

impl UsbBuffers {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            control: [0; CONTROL_LEN],
            config_descriptor: [0; DESCRIPTOR_LEN],
            bos_descriptor: [0; DESCRIPTOR_LEN],
            msos_descriptor: [0; DESCRIPTOR_LEN],
            cdc_state: State::new(),
        }
    }
}

/// Console endpoints split out of the CDC class.
pub struct ConsolePort<D: Driver<'static>> {
    pub tx: Sender<'static, D>,
    pub rx: Receiver<'static, D>,
    pub line_state: ControlChanged<'static>,
}

/// Assembles the device and its console port.
pub fn console_device<D>(
    driver: D,
    buffers: &'static mut UsbBuffers,
    identity: DeviceIdentity,
) -> (UsbDevice<'static, D>, ConsolePort<D>)
where
    D: Driver<'static>,
{
    let mut config = Config::new(VENDOR_ID, PRODUCT_ID);
    config.manufacturer = Some(identity.manufacturer);
    config.product = Some(identity.product);
    config.serial_number = identity.serial_number;
    config.max_packet_size_0 = 64;
    config.max_power = MAX_POWER_MA;

    let UsbBuffers {
        control,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        cdc_state,
    } = buffers;

    let mut builder = Builder::new(
        driver,
        config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control,
    );
    let class = CdcAcmClass::new(&mut builder, cdc_state, MAX_PACKET_SIZE);
    let (tx, rx, line_state) = class.split_with_control();

    (builder.build(), ConsolePort { tx, rx, line_state })
}
