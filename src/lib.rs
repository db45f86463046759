// 粉丝站后端库
//
// 本库提供粉丝站的核心功能，包括：
// - API 路由与管理接口
// - 数据库操作
// - B站接口与封面下载
// - 图集、缩略图、直播、粉丝数等服务
// - 命令行运维任务

pub mod api;
pub mod cli;
pub mod config;
pub mod database;
pub mod external;
pub mod models;
pub mod services;
