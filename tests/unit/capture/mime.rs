use super::*;

const LISTING: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libvpx               libvpx VP8 (codec vp8)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D aac                  AAC (Advanced Audio Coding)
";

struct Only(&'static [&'static str]);

impl EncoderSupport for Only {
    fn supports(&self, encoder: &str) -> bool {
        self.0.contains(&encoder)
    }
}

fn candidates(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn listing_parses_encoder_names() {
    let enc = FfmpegEncoders::from_listing(LISTING);
    assert!(enc.supports("libvpx"));
    assert!(enc.supports("libvpx-vp9"));
    assert!(enc.supports("aac"));
    assert!(!enc.supports("="));
    assert!(!enc.supports("libx264"));
    assert_eq!(enc.len(), 3);
}

#[test]
fn mime_strings_map_to_profiles() {
    let p = profile_for_mime("video/webm;codecs=vp9").unwrap();
    assert_eq!((p.container, p.codec), (Container::WebM, VideoCodec::Vp9));
    let p = profile_for_mime("Video/WebM; codecs=\"vp8\"").unwrap();
    assert_eq!((p.container, p.codec), (Container::WebM, VideoCodec::Vp8));
    let p = profile_for_mime("video/mp4").unwrap();
    assert_eq!((p.container, p.codec), (Container::Mp4, VideoCodec::H264));
    assert!(profile_for_mime("video/ogg").is_none());
    assert!(profile_for_mime("video/webm;codecs=av1").is_none());
}

#[test]
fn first_supported_candidate_wins() {
    let list = candidates(&["video/webm;codecs=vp9", "video/webm;codecs=vp8", "video/webm"]);
    let p = negotiate(&list, &Only(&["libvpx", "libvpx-vp9"]));
    assert_eq!(p.mime_type, "video/webm;codecs=vp9");

    let p = negotiate(&list, &Only(&["libvpx"]));
    assert_eq!(p.mime_type, "video/webm;codecs=vp8");
}

#[test]
fn nothing_supported_falls_back() {
    let list = candidates(&["video/ogg", "video/mp4;codecs=avc1"]);
    let p = negotiate(&list, &Only(&[]));
    assert_eq!(p.mime_type, FALLBACK_MIME);
    assert_eq!(p.codec, VideoCodec::Vp8);
    assert_eq!(negotiate(&[], &Only(&[])).mime_type, FALLBACK_MIME);
}

#[test]
fn extensions_follow_container() {
    assert_eq!(extension_for_mime("video/webm;codecs=vp9"), "webm");
    assert_eq!(extension_for_mime("video/mp4;codecs=avc1"), "mp4");
    assert_eq!(extension_for_mime("video/x-matroska"), "mkv");
    assert_eq!(extension_for_mime("application/octet-stream"), "bin");
}
