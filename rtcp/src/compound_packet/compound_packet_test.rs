use super::*;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::receiver_report::ReceiverReport;

fn boxed<P: Packet + 'static>(p: P) -> Box<dyn Packet + Send + Sync> {
    Box::new(p)
}

#[test]
fn test_valid_compound() {
    let packets = vec![
        boxed(ReceiverReport::default()),
        boxed(SourceDescription::cname(1, "cname")),
    ];
    validate(&packets).unwrap();
}

#[test]
fn test_feedback_after_cname_allowed() {
    let packets = vec![
        boxed(ReceiverReport::default()),
        boxed(SourceDescription::cname(1, "cname")),
        boxed(PictureLossIndication {
            sender_ssrc: 1,
            media_ssrc: 2,
        }),
    ];
    validate(&packets).unwrap();
}

#[test]
fn test_bad_first_packet() {
    let packets = vec![boxed(SourceDescription::cname(1, "cname"))];
    assert_eq!(validate(&packets).unwrap_err(), Error::BadFirstPacket);
}

#[test]
fn test_missing_cname() {
    let packets = vec![boxed(ReceiverReport::default())];
    assert_eq!(validate(&packets).unwrap_err(), Error::MissingCname);
}

#[test]
fn test_packet_before_cname() {
    let packets = vec![
        boxed(ReceiverReport::default()),
        boxed(PictureLossIndication {
            sender_ssrc: 1,
            media_ssrc: 2,
        }),
        boxed(SourceDescription::cname(1, "cname")),
    ];
    assert_eq!(validate(&packets).unwrap_err(), Error::PacketBeforeCname);
}
