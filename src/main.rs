// main.rs — 桌面全景查看器：winit 事件 -> Viewer，wgpu 渲染，egui 菜单 / 状态栏 / 标记叠加

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // Release 模式下隐藏控制台窗口

mod i18n;
mod renderer;

use pano_viewport::markers::{Coordinates, MarkerShape};
use pano_viewport::projector::{direction, spherical};
use pano_viewport::{
    Frame, InputMessage, Key, Marker, PanoData, ProjectedShape, TaskHandle, ThreadedImageLoader,
    Viewer, ViewerConfig, ViewerError, ViewerEvent, Viewport,
};
use renderer::{Renderer, RendererError};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Viewer(#[from] ViewerError),
    #[error(transparent)]
    Renderer(#[from] RendererError),
    #[error("cannot create window: {0}")]
    Window(#[from] winit::error::OsError),
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    panorama: Option<String>,
}

fn parse_args(args: &[String]) -> Args {
    let mut out = Args::default();
    let mut it = args.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--config" => out.config = it.next().map(PathBuf::from),
            "--lang" => {
                it.next();
            }
            _ if out.panorama.is_none() && !a.starts_with("--") => out.panorama = Some(a.clone()),
            _ => log::warn!("ignoring argument {a}"),
        }
    }
    out
}

/// 界面状态（不属于查看器核心的部分）
struct UiState {
    show_fps: bool,
    fps: f32,
    is_fullscreen: bool,
    current_lang: String,
    status: Option<String>,
    load: Option<TaskHandle>,
    pending_open: Option<PathBuf>,
    exit: bool,
}

impl UiState {
    fn is_loading(&self) -> bool {
        self.load.as_ref().map_or(false, |h| !h.is_finished())
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let argv: Vec<String> = std::env::args().collect();
    let current_lang = i18n::resolve_lang(&argv);
    i18n::init(current_lang.clone());
    let args = parse_args(&argv);

    let mut config = match &args.config {
        Some(path) => ViewerConfig::from_json_file(path).map_err(ViewerError::from)?,
        None => ViewerConfig::default(),
    };
    if args.panorama.is_some() {
        config.panorama = args.panorama.clone();
    }

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(i18n::tr("app.title"))
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)?,
    );

    let mut renderer = pollster::block_on(Renderer::new(window.clone()))?;
    let size = window.inner_size();
    let mut viewer = Viewer::new(
        config,
        ThreadedImageLoader::new(),
        Viewport::new(f64::from(size.width), f64::from(size.height)),
    )?;

    let started = Instant::now();
    let mut cursor = PhysicalPosition::new(0.0, 0.0);
    let mut last_fps_time = Instant::now();
    let mut frame_count = 0u32;
    let mut ui = UiState {
        show_fps: false,
        fps: 0.0,
        is_fullscreen: false,
        current_lang,
        status: None,
        load: None,
        pending_open: None,
        exit: false,
    };

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        let now = started.elapsed();

        match event {
            Event::WindowEvent { event, .. } => {
                // 先交给 egui；松开按键必须到达查看器，否则拖拽会卡住
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                let is_release = matches!(
                    event,
                    WindowEvent::MouseInput {
                        state: ElementState::Released,
                        ..
                    }
                );
                if response.consumed && !is_release {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        viewer.resize(f64::from(new_size.width), f64::from(new_size.height));
                    }
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        renderer.resize(*new_inner_size);
                        viewer.resize(f64::from(new_inner_size.width), f64::from(new_inner_size.height));
                    }

                    WindowEvent::Focused(focused) => viewer.handle_input(InputMessage::Focus(focused), now),

                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        match input.virtual_keycode {
                            Some(VirtualKeyCode::O) => {
                                if let Some(path) = pick_image() {
                                    ui.pending_open = Some(path);
                                }
                            }
                            Some(VirtualKeyCode::F11) => toggle_fullscreen(&window, &mut viewer, &mut ui, now),
                            Some(code) => {
                                if let Some(key) = map_key(code) {
                                    viewer.handle_input(InputMessage::Key(key), now);
                                }
                            }
                            None => {}
                        }
                    }

                    WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                        let (x, y) = (cursor.x, cursor.y);
                        let msg = match state {
                            ElementState::Pressed => InputMessage::PointerDown { x, y },
                            ElementState::Released => InputMessage::PointerUp { x, y },
                        };
                        viewer.handle_input(msg, now);
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position;
                        viewer.handle_input(InputMessage::PointerMove { x: position.x, y: position.y }, now);
                    }

                    WindowEvent::MouseWheel { delta, .. } => {
                        let scroll = match delta {
                            MouseScrollDelta::LineDelta(_, y) => f64::from(y),
                            MouseScrollDelta::PixelDelta(pos) => pos.y,
                        };
                        viewer.handle_input(InputMessage::Wheel { delta: scroll }, now);
                    }

                    WindowEvent::Touch(touch) => {
                        let (id, x, y) = (touch.id, touch.location.x, touch.location.y);
                        let msg = match touch.phase {
                            TouchPhase::Started => InputMessage::TouchStart { id, x, y },
                            TouchPhase::Moved => InputMessage::TouchMove { id, x, y },
                            TouchPhase::Ended | TouchPhase::Cancelled => InputMessage::TouchEnd { id, x, y },
                        };
                        viewer.handle_input(msg, now);
                    }

                    WindowEvent::DroppedFile(path) => ui.pending_open = Some(path),

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                frame_count += 1;
                let elapsed = last_fps_time.elapsed().as_secs_f32();
                if elapsed >= 1.0 {
                    ui.fps = frame_count as f32 / elapsed;
                    frame_count = 0;
                    last_fps_time = Instant::now();
                }

                let frame = viewer.tick(now, &mut renderer);
                for event in viewer.drain_events() {
                    handle_viewer_event(&event, &mut ui);
                }

                let scale = window.scale_factor() as f32;
                let render_result = renderer.render_with_ui(&window, |ctx| {
                    draw_markers(ctx, &viewer, &frame, scale);
                    draw_ui(ctx, &mut viewer, &frame, &mut ui, &window, now);
                });

                if let Some(path) = ui.pending_open.take() {
                    ui.load = Some(viewer.set_panorama(path.display().to_string(), None));
                }
                if ui.exit {
                    *control_flow = ControlFlow::Exit;
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.reconfigure(),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {e:?}"),
                }
            }

            Event::MainEventsCleared => window.request_redraw(),

            _ => {}
        }
    })
}

fn map_key(code: VirtualKeyCode) -> Option<Key> {
    Some(match code {
        VirtualKeyCode::Left => Key::ArrowLeft,
        VirtualKeyCode::Right => Key::ArrowRight,
        VirtualKeyCode::Up => Key::ArrowUp,
        VirtualKeyCode::Down => Key::ArrowDown,
        VirtualKeyCode::PageUp => Key::PageUp,
        VirtualKeyCode::PageDown => Key::PageDown,
        VirtualKeyCode::Plus | VirtualKeyCode::Equals | VirtualKeyCode::NumpadAdd => Key::Plus,
        VirtualKeyCode::Minus | VirtualKeyCode::NumpadSubtract => Key::Minus,
        _ => return None,
    })
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter(&i18n::tr("file.filter.images"), &IMAGE_EXTENSIONS)
        .pick_file()
}

fn toggle_fullscreen(window: &Window, viewer: &mut Viewer<ThreadedImageLoader>, ui: &mut UiState, now: Duration) {
    ui.is_fullscreen = !ui.is_fullscreen;
    window.set_fullscreen(ui.is_fullscreen.then(|| Fullscreen::Borderless(None)));
    viewer.handle_input(InputMessage::Fullscreen(ui.is_fullscreen), now);
}

fn handle_viewer_event(event: &ViewerEvent, ui: &mut UiState) {
    match event {
        ViewerEvent::PanoramaLoaded { source } => {
            ui.status = Some(i18n::tr_with("status.loaded", &[("source", source.clone())]));
        }
        ViewerEvent::LoadFailed { source, reason } => {
            ui.status = Some(i18n::tr_with(
                "status.load_failed",
                &[("source", source.clone()), ("err", reason.clone())],
            ));
        }
        ViewerEvent::MarkerSelected { id } => {
            ui.status = Some(i18n::tr_with("status.marker_selected", &[("id", id.clone())]));
        }
        ViewerEvent::Click {
            longitude,
            latitude,
            texture_x,
            texture_y,
            ..
        } => {
            ui.status = Some(i18n::tr_with(
                "status.click",
                &[
                    ("lon", format!("{:.1}°", longitude.to_degrees())),
                    ("lat", format!("{:.1}°", latitude.to_degrees())),
                    ("x", format!("{texture_x:.0}")),
                    ("y", format!("{texture_y:.0}")),
                ],
            ));
        }
        _ => log::trace!("{event:?}"),
    }
}

/// 标记的朝向：点 / 圆取中心，多边形取各顶点方向的平均
fn marker_position(marker: &Marker, pano: Option<PanoData>) -> Option<(f64, f64)> {
    let to_dir = |c: &Coordinates| match *c {
        Coordinates::Spherical { longitude, latitude } => Some(direction(longitude, latitude)),
        Coordinates::Texture { x, y } => {
            let (lon, lat) = pano?.texture_to_spherical(x, y);
            Some(direction(lon, lat))
        }
    };
    let dir = match &marker.shape {
        MarkerShape::Point { position, .. } => to_dir(position)?,
        MarkerShape::Circle { center, .. } => to_dir(center)?,
        MarkerShape::Polygon { vertices } => vertices
            .iter()
            .filter_map(to_dir)
            .fold(glam::DVec3::ZERO, |acc, d| acc + d),
    };
    (dir.length_squared() > 1e-12).then(|| spherical(dir))
}

fn draw_markers(ctx: &egui::Context, viewer: &Viewer<ThreadedImageLoader>, frame: &Frame, scale: f32) {
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Background, egui::Id::new("markers")));
    let to_pos = |x: f64, y: f64| egui::pos2(x as f32 / scale, y as f32 / scale);
    let stroke = egui::Stroke::new(2.0, egui::Color32::from_rgb(255, 200, 40));
    let fill = egui::Color32::from_rgba_unmultiplied(255, 200, 40, 60);
    let hover = ctx.pointer_hover_pos();

    for projection in frame.markers.iter().filter(|p| p.visible) {
        let Some(marker) = viewer.markers().get(&projection.id) else {
            continue;
        };
        let (label_pos, hovered) = match &projection.shape {
            Some(ProjectedShape::Point { anchor, rect }) => {
                let r = egui::Rect::from_min_size(
                    to_pos(rect.left, rect.top),
                    egui::vec2(rect.width as f32 / scale, rect.height as f32 / scale),
                );
                painter.rect(r, 4.0, fill, stroke);
                painter.circle_filled(to_pos(anchor.x, anchor.y), 3.0, stroke.color);
                (r.center_top(), hover.map_or(false, |h| r.contains(h)))
            }
            Some(ProjectedShape::Circle { center, radius }) => {
                let c = to_pos(center.x, center.y);
                let r = *radius as f32 / scale;
                painter.circle(c, r, fill, stroke);
                (c - egui::vec2(0.0, r), hover.map_or(false, |h| h.distance(c) <= r))
            }
            Some(ProjectedShape::Polygon { points }) => {
                let pts: Vec<egui::Pos2> = points.iter().map(|p| to_pos(p.x, p.y)).collect();
                let top = pts
                    .iter()
                    .copied()
                    .fold(egui::pos2(0.0, f32::INFINITY), |a, p| if p.y < a.y { p } else { a });
                painter.add(egui::Shape::closed_line(pts.clone(), stroke));
                let inside = hover.map_or(false, |h| egui::Rect::from_points(&pts).contains(h));
                (top, inside)
            }
            None => continue,
        };

        if hovered {
            let text = marker
                .tooltip
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_else(|| marker.id.clone());
            painter.text(
                label_pos - egui::vec2(0.0, 6.0),
                egui::Align2::CENTER_BOTTOM,
                text,
                egui::FontId::proportional(14.0),
                egui::Color32::WHITE,
            );
        }
    }
}

fn draw_ui(
    ctx: &egui::Context,
    viewer: &mut Viewer<ThreadedImageLoader>,
    frame: &Frame,
    ui_state: &mut UiState,
    window: &Window,
    now: Duration,
) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button(i18n::tr("menu.file"), |ui| {
                if ui.button(i18n::tr("menu.open_image")).clicked() {
                    ui.close_menu();
                    ui_state.pending_open = pick_image();
                }
                if ui.button(i18n::tr("menu.exit")).clicked() {
                    ui_state.exit = true;
                }
            });

            ui.menu_button(i18n::tr("menu.view"), |ui| {
                if ui.button(i18n::tr("view.reset")).clicked() {
                    let config = viewer.config();
                    let (lon, lat) = (config.default_longitude.0, config.default_latitude.0);
                    let zoom = config.default_zoom_level();
                    let target = pano_viewport::ViewTarget::position(lon, lat).with_zoom(zoom);
                    let duration = Duration::from_millis(config.transition_duration_ms);
                    if let Err(e) = viewer.animate(target, duration) {
                        log::warn!("{e}");
                    }
                    ui.close_menu();
                }
                let fullscreen_label = if ui_state.is_fullscreen {
                    i18n::tr("view.fullscreen.exit")
                } else {
                    i18n::tr("view.fullscreen.enter")
                };
                if ui.button(fullscreen_label).clicked() {
                    toggle_fullscreen(window, viewer, ui_state, now);
                    ui.close_menu();
                }
                let mut autorotate = viewer.is_autorotating();
                if ui.checkbox(&mut autorotate, i18n::tr("view.autorotate")).clicked() {
                    viewer.toggle_autorotate();
                    ui.close_menu();
                }
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button(i18n::tr("view.zoom_out")).clicked() {
                        let level = f64::from(frame.view.zoom_level) - 10.0;
                        if let Err(e) = viewer.set_zoom_level(level, true) {
                            log::warn!("{e}");
                        }
                    }
                    if ui.button(i18n::tr("view.zoom_in")).clicked() {
                        let level = f64::from(frame.view.zoom_level) + 10.0;
                        if let Err(e) = viewer.set_zoom_level(level, true) {
                            log::warn!("{e}");
                        }
                    }
                });
                ui.separator();
                if ui.checkbox(&mut ui_state.show_fps, i18n::tr("view.show_fps")).clicked() {
                    ui.close_menu();
                }
            });

            ui.menu_button(i18n::tr("menu.markers"), |ui| {
                if viewer.markers().is_empty() {
                    ui.label(i18n::tr("markers.none"));
                }
                let pano = viewer.pano_data();
                let targets: Vec<(String, Option<(f64, f64)>)> = viewer
                    .markers()
                    .iter()
                    .map(|m| (m.id.clone(), marker_position(m, pano)))
                    .collect();
                for (id, position) in targets {
                    let clicked = ui
                        .add_enabled(position.is_some(), egui::Button::new(id.as_str()))
                        .clicked();
                    if let (true, Some((lon, lat))) = (clicked, position) {
                        if let Err(e) = viewer.set_position(lon, lat, true) {
                            log::warn!("{e}");
                        }
                        ui.close_menu();
                    }
                }
            });

            ui.menu_button(i18n::tr("menu.language"), |ui| {
                for (code, name) in i18n::LANGUAGES {
                    if ui
                        .radio_value(&mut ui_state.current_lang, code.to_string(), name)
                        .clicked()
                    {
                        i18n::init(ui_state.current_lang.clone());
                        window.set_title(&i18n::tr("app.title"));
                        ui.close_menu();
                    }
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if ui_state.is_loading() {
                ui.label(egui::RichText::new(i18n::tr("status.loading_image")).color(egui::Color32::YELLOW));
                ui.label("|");
            }

            let view = frame.view;
            ui.label(format!("{} {}%", i18n::tr("status.zoom_prefix"), view.zoom_level));
            ui.label("|");
            ui.label(format!("FOV: {:.1}°", view.fov));
            ui.label("|");
            {
                // 等效全画幅焦距（按对角线）
                let diag = (36.0f64 * 36.0 + 24.0 * 24.0).sqrt();
                let focal = diag / (2.0 * (view.fov.to_radians() * 0.5).tan());
                ui.label(format!("{} {:.1}mm", i18n::tr("status.equiv_focal_prefix"), focal));
            }
            ui.label("|");
            ui.label(format!("{} {:.1}°", i18n::tr("status.longitude"), view.longitude.to_degrees()));
            ui.label("|");
            ui.label(format!("{} {:.1}°", i18n::tr("status.latitude"), view.latitude.to_degrees()));
            if viewer.is_autorotating() {
                ui.label("|");
                ui.label(i18n::tr("status.autorotate"));
            }
            if let Some(status) = &ui_state.status {
                ui.label("|");
                ui.label(status.as_str());
            }
            if ui_state.show_fps {
                ui.label("|");
                ui.label(egui::RichText::new(format!("FPS: {:.1}", ui_state.fps)).color(egui::Color32::GREEN));
            }
        });
    });
}
