#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
mod gpu {
    use std::{sync::Arc, time::Duration};

    use flow_ribbon::{
        CycleVariant, Context, EngineConfig, RibbonEngine, RibbonState, TileEngine, TileError,
        TileMetadata,
        cgmath::{Vector2, Vector3},
        data_structures::{
            material::{ArrayTextureMaterial, MaterialKind},
            ribbon_mesh::WaveParams,
        },
        pipelines::{RibbonPipeline, ribbon::DEPTH_FORMAT},
        render::{Render, draw_ribbon},
        resources::{LoadStage, MemorySource, TileSource},
    };
    use futures::{StreamExt, channel::mpsc};

    use crate::common::test_utils::{headless, init_logger, strip_png, tagged_tile};

    fn three_tiles() -> Arc<dyn TileSource> {
        Arc::new(MemorySource::new(vec![
            tagged_tile(0, 8, 4),
            tagged_tile(1, 8, 4),
            tagged_tile(2, 8, 4),
        ]))
    }

    #[tokio::test]
    async fn load_replaces_broken_tiles_and_reports() {
        init_logger();
        let ctx = headless().await;
        let mut tiles = TileEngine::new(&ctx, &EngineConfig::default());

        let source = Arc::new(
            MemorySource::new(vec![
                tagged_tile(0, 8, 4),
                b"not a tile".to_vec(),
                tagged_tile(2, 8, 6),
            ])
            .with_metadata(TileMetadata {
                variant: Some(CycleVariant::PingPong),
                fps: Some(12.0),
                ..Default::default()
            }),
        );
        let (tx, rx) = mpsc::unbounded();
        let report = tiles.load_with_progress(&ctx, source, tx).await.expect("load");

        assert_eq!(report.tile_count, 3);
        assert_eq!(report.layer_count, 4);
        assert_eq!(report.fallbacks, vec![1]);
        assert_eq!(report.variant, CycleVariant::PingPong);
        assert!((tiles.state().cadence_fps() - 12.0).abs() < 1e-9);
        assert_eq!(tiles.textures()[1].layers, 4);
        assert_eq!(tiles.textures()[2].layers, 6);

        let uploads = rx
            .filter(|p| futures::future::ready(p.stage == LoadStage::Upload))
            .count()
            .await;
        assert_eq!(uploads, 3);
    }

    #[tokio::test]
    async fn nothing_decodable_fails_without_touching_the_current_set() {
        init_logger();
        let ctx = headless().await;
        let mut tiles = TileEngine::new(&ctx, &EngineConfig::default());
        tiles.load(&ctx, three_tiles()).await.expect("first load");

        let broken = Arc::new(MemorySource::new(vec![Vec::new(), b"??".to_vec()]));
        let err = tiles.load(&ctx, broken).await.expect_err("no usable tile");
        assert!(matches!(err, TileError::NoUsableTiles { requested: 2 }));
        assert_eq!(tiles.tile_count(), 3);
    }

    #[tokio::test]
    async fn superseded_and_disposed_loads_do_not_commit() {
        init_logger();
        let ctx = headless().await;
        let mut tiles = TileEngine::new(&ctx, &EngineConfig::default());

        let old = tiles.prepare_load(three_tiles());
        let new = tiles.prepare_load(three_tiles());
        let old_batch = old.decode().await.expect("decode");
        assert!(matches!(tiles.commit(&ctx, old_batch), Err(TileError::Stale)));
        assert!(!tiles.is_loaded());

        let new_batch = new.decode().await.expect("decode");
        let pending = tiles.prepare_load(three_tiles());
        tiles.dispose();
        assert!(matches!(tiles.commit(&ctx, new_batch), Err(TileError::Disposed)));
        let late = pending.decode().await.expect("decode finishes after dispose");
        assert!(matches!(tiles.commit(&ctx, late), Err(TileError::Disposed)));
        assert!(tiles.is_disposed());
        assert!(!tiles.tick(&ctx, Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn tick_drives_the_shared_uniform() {
        init_logger();
        let ctx = headless().await;
        let mut tiles = TileEngine::new(&ctx, &EngineConfig::default());
        tiles.load(&ctx, three_tiles()).await.expect("load");

        let cadence = tiles.state().cadence();
        assert!(tiles.tick(&ctx, cadence));
        assert_eq!(tiles.shared_state().current().layer, 1);
        assert!(!tiles.tick(&ctx, cadence));
        for k in 2..=4 {
            tiles.tick(&ctx, cadence * k);
        }
        assert_eq!(tiles.shared_state().current().layer, 0);
    }

    #[tokio::test]
    async fn flow_wraps_and_rotates_materials() {
        init_logger();
        let ctx = headless().await;
        let mut tiles = TileEngine::new(&ctx, &EngineConfig::default());
        tiles.load(&ctx, three_tiles()).await.expect("load");

        assert_eq!(tiles.material(1).expect("material").kind(), MaterialKind::Layer);
        tiles.set_flow(&ctx, true, 0.75);
        let material = tiles.material(1).expect("material");
        assert_eq!(material.kind(), MaterialKind::Flow);
        assert_eq!(material.tiles(), (1, 2));

        // 0.75 tiles/s for 2 s crosses one tile boundary
        tiles.tick(&ctx, Duration::from_secs(2));
        let uniform = tiles.shared_state().current();
        assert!((uniform.flow_offset - 0.5).abs() < 1e-6);
        assert_eq!(uniform.flow_enabled, 1);
        assert_eq!(tiles.state().tile_base_offset(), 1);
        assert_eq!(tiles.material(1).expect("material").tiles(), (2, 0));
        assert_eq!(tiles.material(2).expect("material").tiles(), (0, 1));
        assert_eq!(tiles.flow_pair(1), Some((2, 0)));

        let standalone = tiles.create_flow_material(&ctx, 0).expect("material");
        assert_eq!(standalone.tiles(), (1, 2));
    }

    #[tokio::test]
    async fn ribbon_lifecycle() {
        init_logger();
        let ctx = headless().await;
        let config = EngineConfig::default();
        let mut tiles = TileEngine::new(&ctx, &config);
        tiles.load(&ctx, three_tiles()).await.expect("load");
        let mut ribbon = RibbonEngine::new(&config);
        assert_eq!(ribbon.state(), RibbonState::Empty);

        let single = [Vector3::new(0.0, 0.0, 0.0)];
        assert_eq!(ribbon.build_from_path(&ctx, &single, 1.0), RibbonState::Empty);

        let points: Vec<Vector3<f32>> =
            (0..=20).map(|i| Vector3::new(i as f32 * 0.5, 0.0, 0.0)).collect();
        assert_eq!(ribbon.build_from_path(&ctx, &points, 1.0), RibbonState::Built);
        assert_eq!(ribbon.segment_count(), 10);
        let shown: Vec<usize> = ribbon
            .mesh()
            .expect("mesh")
            .segments()
            .iter()
            .filter_map(|s| s.material_index(tiles.tile_count()))
            .collect();
        assert_eq!(&shown[..4], &[0, 1, 2, 0]);

        let period = ribbon.sync_wave_to_tiles(&tiles, config.wave.target_period);
        assert!(period > 0.0);
        ribbon.update_wave_animation(&ctx, 0.5);
        assert_eq!(ribbon.state(), RibbonState::Animating);
        assert!(ribbon.mesh().expect("mesh").segments().iter().all(|s| !s.is_dirty()));

        // rebuilding goes back to Built
        let raw = [Vector2::new(0.0, 0.0), Vector2::new(100.0, 40.0), Vector2::new(200.0, 0.0)];
        assert_eq!(ribbon.build_from_points_2d(&ctx, &raw, 1.0), RibbonState::Built);

        ribbon.dispose();
        assert_eq!(ribbon.state(), RibbonState::Empty);
        assert_eq!(ribbon.segment_count(), 0);
    }

    #[tokio::test]
    async fn ribbon_draws_into_an_offscreen_target() {
        init_logger();
        let ctx = headless().await;
        let config = EngineConfig::default();
        let mut tiles = TileEngine::new(&ctx, &config);
        tiles.load(&ctx, three_tiles()).await.expect("load");
        let mut ribbon = RibbonEngine::new(&config);
        let points = [Vector3::new(-1.0, 0.0, 0.5), Vector3::new(1.0, 0.0, 0.5)];
        ribbon.build_from_path(&ctx, &points, 0.5);
        ribbon.update_wave_animation(&ctx, 0.0);

        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let pipeline = RibbonPipeline::new(&ctx, &tiles, format, Some(DEPTH_FORMAT));
        let extent = wgpu::Extent3d {
            width: 64,
            height: 64,
            depth_or_array_layers: 1,
        };
        let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen depth"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = target.create_view(&Default::default());
        let depth_view = depth.create_view(&Default::default());

        let mut encoder = ctx.device.create_command_encoder(&Default::default());
        let draws = {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ribbon test pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            draw_ribbon(&mut pass, &pipeline, &ribbon, &tiles)
        };
        ctx.queue.submit(Some(encoder.finish()));
        assert_eq!(draws, ribbon.segment_count());
    }

    #[tokio::test]
    async fn ribbon_built_before_loading_follows_the_tile_set() {
        init_logger();
        let ctx = headless().await;
        let mut config = EngineConfig::default();
        config.ribbon.ribbon_offset = 2;
        let mut tiles = TileEngine::new(&ctx, &config);
        let mut ribbon = RibbonEngine::new(&config);

        let points = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(5.0, 0.0, 0.0)];
        assert_eq!(ribbon.build_from_path(&ctx, &points, 1.0), RibbonState::Built);
        let drawn = |ribbon: &RibbonEngine, tiles: &TileEngine| match ribbon.render(tiles) {
            Render::Ribbon(flats) => flats.len(),
            _ => 0,
        };
        assert_eq!(drawn(&ribbon, &tiles), 0);

        tiles.load(&ctx, three_tiles()).await.expect("load");
        let shown = |ribbon: &RibbonEngine, n: usize| -> Vec<usize> {
            let mesh = ribbon.mesh().expect("mesh");
            mesh.segments().iter().filter_map(|s| s.material_index(n)).collect()
        };
        assert_eq!(shown(&ribbon, tiles.tile_count()), vec![2, 0, 1, 2, 0]);
        assert_eq!(drawn(&ribbon, &tiles), 5);

        let four = Arc::new(MemorySource::new(
            (0..4u8).map(|i| tagged_tile(i, 8, 4)).collect(),
        ));
        tiles.load(&ctx, four).await.expect("reload");
        assert_eq!(shown(&ribbon, tiles.tile_count()), vec![2, 3, 0, 1, 2]);
    }

    const SIZE: u32 = 64;

    fn solid(colour: [u8; 4]) -> Vec<u8> {
        strip_png(8, 2, move |_| colour)
    }

    /// Draws `ribbon` over the whole target and reads the pixels back.
    async fn render_to_image(
        ctx: &Context,
        tiles: &TileEngine,
        ribbon: &RibbonEngine,
    ) -> image::RgbaImage {
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let pipeline = RibbonPipeline::new(ctx, tiles, format, None);
        let extent = wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        };
        let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("seam target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&Default::default());
        let u32_size = std::mem::size_of::<u32>() as u32;
        let output = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("seam readback"),
            size: (u32_size * SIZE * SIZE) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx.device.create_command_encoder(&Default::default());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("seam pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            draw_ribbon(&mut pass, &pipeline, ribbon, tiles);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(u32_size * SIZE),
                    rows_per_image: Some(SIZE),
                },
            },
            extent,
        );
        ctx.queue.submit(Some(encoder.finish()));

        let (tx, rx) = futures::channel::oneshot::channel();
        let slice = output.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::PollType::Wait).expect("poll");
        rx.await.expect("map callback").expect("map");
        let data = slice.get_mapped_range().to_vec();
        output.unmap();
        image::RgbaImage::from_raw(SIZE, SIZE, data).expect("image")
    }

    fn dominant(pixel: &image::Rgba<u8>) -> usize {
        let [r, g, b, _] = pixel.0;
        [r, g, b]
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| **c)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn flow_samples_the_next_tile_past_the_seam() {
        init_logger();
        let ctx = headless().await;
        let config = EngineConfig::default();
        let mut tiles = TileEngine::new(&ctx, &config);
        // red, green, blue tiles
        let source = Arc::new(MemorySource::new(vec![
            solid([255, 0, 0, 255]),
            solid([0, 255, 0, 255]),
            solid([0, 0, 255, 255]),
        ]));
        tiles.load(&ctx, source).await.expect("load");

        // one segment spanning the whole clip space, u = 0 at the left edge
        let mut ribbon = RibbonEngine::new(&config);
        ribbon.set_wave(WaveParams::FLAT);
        let points = [Vector3::new(-1.0, 0.0, 0.5), Vector3::new(1.0, 0.0, 0.5)];
        ribbon.build_from_path(&ctx, &points, 2.0);
        assert_eq!(ribbon.segment_count(), 1);
        ribbon.update_wave_animation(&ctx, 0.0);

        let row = SIZE / 2;
        let still = render_to_image(&ctx, &tiles, &ribbon).await;
        assert_eq!(dominant(still.get_pixel(SIZE / 4, row)), 0);
        assert_eq!(dominant(still.get_pixel(SIZE - 4, row)), 0);

        // offset 0.25: the seam sits at u = 0.75
        tiles.set_flow(&ctx, true, 0.25);
        tiles.tick(&ctx, Duration::from_secs(1));
        assert!((tiles.shared_state().current().flow_offset - 0.25).abs() < 1e-6);
        let flowing = render_to_image(&ctx, &tiles, &ribbon).await;
        assert_eq!(dominant(flowing.get_pixel(SIZE / 4, row)), 0);
        assert_eq!(dominant(flowing.get_pixel(SIZE * 5 / 8, row)), 0);
        assert_eq!(dominant(flowing.get_pixel(SIZE - 4, row)), 1);

        // 1.125 tiles in: wrapped once, seam at u = 0.875
        tiles.tick(&ctx, Duration::from_millis(4500));
        assert_eq!(tiles.state().tile_base_offset(), 1);
        let wrapped = render_to_image(&ctx, &tiles, &ribbon).await;
        assert_eq!(dominant(wrapped.get_pixel(SIZE / 4, row)), 1);
        assert_eq!(dominant(wrapped.get_pixel(SIZE - 4, row)), 2);
    }
}
