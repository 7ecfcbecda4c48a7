//! Camera frame types, luma extraction and pixel format conversions.

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use image::GrayImage;

/// Supported pixel formats for camera frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba,
    /// YUV 4:2:2 packed format (Y0 U0 Y1 V0)
    Yuyv,
    /// YUV 4:2:2 packed format (U0 Y0 V0 Y1)
    Uyvy,
    /// NV12 semi-planar format (Y plane + interleaved UV)
    Nv12,
    /// Single 8-bit luma channel
    Gray,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats; the Y plane only for NV12.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
            PixelFormat::Yuyv | PixelFormat::Uyvy => 2,
            PixelFormat::Nv12 | PixelFormat::Gray => 1,
        }
    }

    /// Minimum buffer length for a frame of this format.
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Nv12 => w * h + (w + w % 2) * h.div_ceil(2),
            _ => w * h * self.bytes_per_pixel(),
        }
    }
}

/// A camera frame as delivered by a capture backend.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of the frame data
    pub format: PixelFormat,
    /// Timestamp in microseconds (if available)
    pub timestamp_us: Option<u64>,
    /// Raw pixel data
    pub data: Vec<u8>,
}

/// BT.601 studio-range luma of one RGB sample.
#[inline]
pub fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    let y = ((66 * u32::from(r) + 129 * u32::from(g) + 25 * u32::from(b) + 128) >> 8) + 16;
    y.min(255) as u8
}

impl VideoFrame {
    /// Creates a video frame from existing data.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            timestamp_us: None,
            data,
        }
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = Some(timestamp_us);
        self
    }

    fn check_len(&self) -> Result<()> {
        let needed = self.format.frame_len(self.width, self.height);
        if self.data.len() < needed {
            return Err(anyhow!(
                "{:?} frame {}x{} needs {} bytes, got {}",
                self.format,
                self.width,
                self.height,
                needed,
                self.data.len()
            ));
        }
        Ok(())
    }

    /// Extracts the luma plane into a freshly allocated [`FrameBuffer`].
    ///
    /// YUV formats copy their Y samples; RGB formats are converted with the
    /// BT.601 studio-range weights used by the GPU converter.
    pub fn to_luma(&self) -> Result<FrameBuffer> {
        self.check_len()?;
        let pixel_count = (self.width as usize) * (self.height as usize);
        let luma = match self.format {
            PixelFormat::Gray | PixelFormat::Nv12 => self.data[..pixel_count].to_vec(),
            PixelFormat::Yuyv => self.data.iter().step_by(2).take(pixel_count).copied().collect(),
            PixelFormat::Uyvy => self.data.iter().skip(1).step_by(2).take(pixel_count).copied().collect(),
            PixelFormat::Rgb => self
                .data
                .chunks_exact(3)
                .take(pixel_count)
                .map(|px| rgb_to_luma(px[0], px[1], px[2]))
                .collect(),
            PixelFormat::Rgba => self
                .data
                .chunks_exact(4)
                .take(pixel_count)
                .map(|px| rgb_to_luma(px[0], px[1], px[2]))
                .collect(),
        };

        Ok(FrameBuffer {
            data: luma,
            width: self.width,
            height: self.height,
            timestamp_us: self.timestamp_us,
        })
    }

    /// Converts this frame to RGBA format.
    pub fn to_rgba(&self) -> Result<VideoFrame> {
        self.check_len()?;
        if self.format == PixelFormat::Rgba {
            return Ok(self.clone());
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let pixel_count = width * height;
        let mut rgba_data = vec![0u8; pixel_count * 4];

        match self.format {
            PixelFormat::Rgb => {
                for (dst, src) in rgba_data.chunks_exact_mut(4).zip(self.data.chunks_exact(3)) {
                    dst[..3].copy_from_slice(src);
                    dst[3] = 255;
                }
            }
            PixelFormat::Gray => {
                for (dst, &y) in rgba_data.chunks_exact_mut(4).zip(&self.data) {
                    dst.copy_from_slice(&[y, y, y, 255]);
                }
            }
            PixelFormat::Yuyv | PixelFormat::Uyvy | PixelFormat::Nv12 => {
                self.convert_yuv_into(&mut rgba_data)?;
            }
            PixelFormat::Rgba => unreachable!(),
        }

        Ok(VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba,
            timestamp_us: self.timestamp_us,
            data: rgba_data,
        })
    }

    fn convert_yuv_into(&self, rgba_data: &mut [u8]) -> Result<()> {
        let width = self.width as usize;
        let height = self.height as usize;

        let dst_color = ezk_image::ColorInfo::RGB(ezk_image::RgbColorInfo {
            transfer: ezk_image::ColorTransfer::Linear,
            primaries: ezk_image::ColorPrimaries::BT709,
        });
        let mut dst_image = ezk_image::Image::from_buffer(
            ezk_image::PixelFormat::RGBA,
            rgba_data,
            None,
            width,
            height,
            dst_color,
        )
        .map_err(|e| anyhow!("failed to wrap RGBA buffer: {e:?}"))?;

        let src_color = ezk_image::ColorInfo::YUV(ezk_image::YuvColorInfo {
            transfer: ezk_image::ColorTransfer::Linear,
            primaries: ezk_image::ColorPrimaries::BT709,
            space: ezk_image::ColorSpace::BT709,
            full_range: false,
        });

        // ezk-image has no UYVY reader; swap byte pairs into YUYV order first.
        let swapped;
        let (format, data) = match self.format {
            PixelFormat::Yuyv => (ezk_image::PixelFormat::YUYV, &self.data[..]),
            PixelFormat::Nv12 => (ezk_image::PixelFormat::NV12, &self.data[..]),
            PixelFormat::Uyvy => {
                swapped = self
                    .data
                    .chunks_exact(2)
                    .flat_map(|pair| [pair[1], pair[0]])
                    .collect::<Vec<u8>>();
                (ezk_image::PixelFormat::YUYV, &swapped[..])
            }
            other => return Err(anyhow!("{other:?} is not a YUV format")),
        };

        let src_image = ezk_image::Image::from_buffer(format, data, None, width, height, src_color)
            .map_err(|e| anyhow!("failed to wrap {:?} buffer: {e:?}", self.format))?;
        ezk_image::convert(&src_image, &mut dst_image)
            .map_err(|e| anyhow!("{:?} -> RGBA conversion failed: {e:?}", self.format))?;
        Ok(())
    }
}

/// Decoder-ready luma samples: row-major, one byte per pixel, no padding.
///
/// Each buffer owns its storage. Producers allocate a new one per frame, so the
/// decode worker never shares memory with the converter that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_us: Option<u64>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let needed = (width as usize) * (height as usize);
        if data.len() != needed {
            return Err(anyhow!("luma buffer {}x{} needs {} bytes, got {}", width, height, needed, data.len()));
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_us: None,
        })
    }

    /// Mean of roughly 100 evenly strided samples.
    pub fn mean_luma(&self) -> u8 {
        if self.data.is_empty() {
            return 0;
        }
        let step = (self.data.len() / 100).max(1);
        let (sum, count) = self
            .data
            .iter()
            .step_by(step)
            .fold((0u64, 0u64), |(sum, count), &y| (sum + u64::from(y), count + 1));
        (sum / count) as u8
    }

    /// Nearest-neighbour rescale, used when a converter target differs from the stream size.
    pub fn resized(self, width: u32, height: u32) -> Result<FrameBuffer> {
        if self.width == width && self.height == height {
            return Ok(self);
        }
        let timestamp_us = self.timestamp_us;
        let image = self.into_gray_image()?;
        let resized = image::imageops::resize(&image, width, height, image::imageops::FilterType::Nearest);
        Ok(FrameBuffer {
            data: resized.into_raw(),
            width,
            height,
            timestamp_us,
        })
    }

    pub fn into_gray_image(self) -> Result<GrayImage> {
        let (width, height) = (self.width, self.height);
        GrayImage::from_raw(width, height, self.data)
            .ok_or_else(|| anyhow!("luma buffer does not match {}x{}", width, height))
    }
}

/// Vertex for rendering a full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl QuadVertex {
    /// Vertices for a full-screen quad. Texture row 0 is the top of the frame.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
        QuadVertex { position: [1.0, -1.0], tex_coords: [1.0, 1.0] },
        QuadVertex { position: [1.0, 1.0], tex_coords: [1.0, 0.0] },
        QuadVertex { position: [-1.0, 1.0], tex_coords: [0.0, 0.0] },
    ];

    /// Indices for the quad (two triangles).
    pub const INDICES: &'static [u16] = &[0, 1, 2, 2, 3, 0];

    /// Returns the vertex buffer layout.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}
