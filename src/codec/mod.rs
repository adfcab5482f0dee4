mod frame;

pub use self::frame::{DecodedFrame, FrameCodec, FrameCodecError, FrameDecode, MalformedFrame};
